//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

use super::{CodecError, NegotiationAction, TelnetFrame, consts};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

/// A codec for handling the Telnet protocol, providing functionality to
/// encode and decode Telnet messages.
///
/// `TelnetCodec` is responsible for managing the state and buffers required
/// for framing the Telnet protocol. It is typically used through
/// `tokio_util::codec::Framed` to handle the transmission and reception of
/// Telnet messages over a connection; the option layer above it interprets
/// the decoded [`TelnetFrame`] stream.
///
/// The decoder is one-shot per stream: after a framing error it must not be
/// fed further input.
pub struct TelnetCodec {
    decoder_state: DecoderState,
    subneg_buffer: BytesMut,
}

impl TelnetCodec {
    /// Creates a new instance of `TelnetCodec`.
    pub fn new() -> TelnetCodec {
        TelnetCodec::default()
    }
}

impl Default for TelnetCodec {
    fn default() -> Self {
        TelnetCodec {
            decoder_state: DecoderState::NormalData,
            subneg_buffer: BytesMut::new(),
        }
    }
}

impl Decoder for TelnetCodec {
    type Item = TelnetFrame;
    type Error = CodecError;

    /// Decodes bytes from the provided `src` buffer into a [`TelnetFrame`]
    /// by interpreting them according to the internal decoder state.
    ///
    /// In-band data is returned one maximal IAC-free run at a time; an
    /// escaped `IAC IAC` decodes to its own one-byte `Data` frame and is
    /// never consolidated onto surrounding data. NOP and unknown two-byte
    /// commands are consumed without producing a frame.
    ///
    /// Returns `Ok(None)` when `src` holds no complete frame, per the
    /// `tokio_util` streaming contract.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<TelnetFrame>, Self::Error> {
        while !src.is_empty() {
            match self.decoder_state {
                DecoderState::NormalData => {
                    if src[0] == consts::IAC {
                        src.advance(1);
                        self.decoder_state = DecoderState::InterpretAsCommand;
                        continue;
                    }
                    // A maximal run of non-IAC bytes.
                    let run = src
                        .iter()
                        .position(|&byte| byte == consts::IAC)
                        .unwrap_or(src.len());
                    return Ok(Some(TelnetFrame::Data(src.split_to(run).freeze())));
                }
                DecoderState::InterpretAsCommand => {
                    let command = src.get_u8();
                    match command {
                        consts::NOP => {
                            self.decoder_state = DecoderState::NormalData;
                        }
                        consts::DM..=consts::GA => {
                            self.decoder_state = DecoderState::NormalData;
                            return Ok(Some(TelnetFrame::Function(command)));
                        }
                        consts::WILL => {
                            self.decoder_state = DecoderState::Negotiate(NegotiationAction::Will);
                        }
                        consts::WONT => {
                            self.decoder_state = DecoderState::Negotiate(NegotiationAction::Wont);
                        }
                        consts::DO => {
                            self.decoder_state = DecoderState::Negotiate(NegotiationAction::Do);
                        }
                        consts::DONT => {
                            self.decoder_state = DecoderState::Negotiate(NegotiationAction::Dont);
                        }
                        consts::IAC => {
                            // IAC+IAC decodes to a literal 0xFF.
                            self.decoder_state = DecoderState::NormalData;
                            return Ok(Some(TelnetFrame::Data(Bytes::from_static(&[
                                consts::IAC,
                            ]))));
                        }
                        consts::SE => {
                            return Err(CodecError::UnexpectedSe);
                        }
                        consts::SB => {
                            self.decoder_state = DecoderState::Subnegotiation;
                        }
                        _ => {
                            // Any unrecognized command code is treated as NOP.
                            warn!("Received unknown command {:#04x}, ignoring", command);
                            self.decoder_state = DecoderState::NormalData;
                        }
                    }
                }
                DecoderState::Negotiate(action) => {
                    let option = src.get_u8();
                    self.decoder_state = DecoderState::NormalData;
                    return Ok(Some(TelnetFrame::Negotiate(action, option)));
                }
                DecoderState::Subnegotiation => {
                    if src[0] == consts::IAC {
                        src.advance(1);
                        self.decoder_state = DecoderState::SubnegotiationIac;
                        continue;
                    }
                    let run = src
                        .iter()
                        .position(|&byte| byte == consts::IAC)
                        .unwrap_or(src.len());
                    self.subneg_buffer.extend_from_slice(&src.split_to(run));
                }
                DecoderState::SubnegotiationIac => {
                    let command = src.get_u8();
                    match command {
                        consts::IAC => {
                            // Unescape IAC+IAC within option subnegotiation.
                            self.subneg_buffer.put_u8(consts::IAC);
                            self.decoder_state = DecoderState::Subnegotiation;
                        }
                        consts::SE => {
                            self.decoder_state = DecoderState::NormalData;
                            let accumulated = self.subneg_buffer.split().freeze();
                            if accumulated.is_empty() {
                                return Err(CodecError::EmptySubnegotiation);
                            }
                            let option = accumulated[0];
                            return Ok(Some(TelnetFrame::Subnegotiate(
                                option,
                                accumulated.slice(1..),
                            )));
                        }
                        _ => {
                            return Err(CodecError::BadSubnegotiationCommand(command));
                        }
                    }
                }
            }
        }
        Ok(None)
    }
}

impl Encoder<TelnetFrame> for TelnetCodec {
    type Error = CodecError;

    /// Encodes a [`TelnetFrame`] into its wire representation.
    ///
    /// Literal 0xFF bytes are doubled, both in `Data` frames and inside
    /// `Subnegotiate` payloads; encoding is the exact inverse of decoding.
    fn encode(&mut self, item: TelnetFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            TelnetFrame::Data(data) => {
                dst.reserve(data.len());
                for &byte in &data {
                    if byte == consts::IAC {
                        dst.put_u8(consts::IAC);
                    }
                    dst.put_u8(byte);
                }
            }
            TelnetFrame::Function(function) => {
                dst.reserve(2);
                dst.put_u8(consts::IAC);
                dst.put_u8(function);
            }
            TelnetFrame::Negotiate(action, option) => {
                dst.reserve(3);
                dst.put_u8(consts::IAC);
                dst.put_u8(action.to_u8());
                dst.put_u8(option);
            }
            TelnetFrame::Subnegotiate(option, payload) => {
                dst.reserve(5 + payload.len());
                dst.put_u8(consts::IAC);
                dst.put_u8(consts::SB);
                dst.put_u8(option);
                for &byte in &payload {
                    if byte == consts::IAC {
                        dst.put_u8(consts::IAC);
                    }
                    dst.put_u8(byte);
                }
                dst.put_u8(consts::IAC);
                dst.put_u8(consts::SE);
            }
        }
        Ok(())
    }
}

/// Internal state of the Telnet decoder.
#[derive(Clone, Copy, Debug)]
enum DecoderState {
    /// Normal in-band data
    NormalData,
    /// Received IAC, next byte is a command
    InterpretAsCommand,
    /// Received DO/DONT/WILL/WONT, next byte is the option code
    Negotiate(NegotiationAction),
    /// Accumulating subnegotiation bytes (option code first)
    Subnegotiation,
    /// Received IAC during subnegotiation, next byte resolves it
    SubnegotiationIac,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> (Vec<TelnetFrame>, Option<CodecError>) {
        let mut codec = TelnetCodec::new();
        let mut src = BytesMut::from(input);
        let mut out = Vec::new();
        loop {
            match codec.decode(&mut src) {
                Ok(Some(frame)) => out.push(frame),
                Ok(None) => return (out, None),
                Err(err) => return (out, Some(err)),
            }
        }
    }

    fn data(bytes: &'static [u8]) -> TelnetFrame {
        TelnetFrame::Data(Bytes::from_static(bytes))
    }

    fn encode_all(frames: Vec<TelnetFrame>) -> BytesMut {
        let mut codec = TelnetCodec::new();
        let mut dst = BytesMut::new();
        for frame in frames {
            codec.encode(frame, &mut dst).expect("encode ok");
        }
        dst
    }

    // ------------------------------------------------------------------
    // Decoding - data and control functions
    // ------------------------------------------------------------------

    #[test]
    fn decode_plain_run() {
        let (frames, err) = decode_all(b"123");
        assert!(err.is_none());
        assert_eq!(frames, vec![data(b"123")]);
    }

    #[test]
    fn decode_nop_is_dropped() {
        let (frames, err) = decode_all(&[b'1', b'2', b'3', consts::IAC, consts::NOP, b'4', b'5', b'6']);
        assert!(err.is_none());
        assert_eq!(frames, vec![data(b"123"), data(b"456")]);
    }

    #[test]
    fn decode_escaped_iac_is_its_own_chunk() {
        let (frames, err) = decode_all(&[b'1', b'2', b'3', consts::IAC, consts::IAC, b'4', b'5', b'6']);
        assert!(err.is_none());
        assert_eq!(frames, vec![data(b"123"), data(&[consts::IAC]), data(b"456")]);
    }

    #[test]
    fn decode_control_function() {
        let (frames, err) = decode_all(&[b'1', b'2', b'3', consts::IAC, consts::AYT, b'4', b'5', b'6']);
        assert!(err.is_none());
        assert_eq!(
            frames,
            vec![data(b"123"), TelnetFrame::Function(consts::AYT), data(b"456")]
        );
    }

    #[test]
    fn decode_unknown_command_treated_as_nop() {
        // IAC b'4' is not a recognized command; it and the IAC vanish.
        let (frames, err) = decode_all(&[b'1', b'2', b'3', consts::IAC, b'4', b'5', b'6']);
        assert!(err.is_none());
        assert_eq!(frames, vec![data(b"123"), data(b"56")]);
    }

    // ------------------------------------------------------------------
    // Decoding - negotiation
    // ------------------------------------------------------------------

    #[test]
    fn decode_will() {
        let (frames, err) = decode_all(&[b'1', consts::IAC, consts::WILL, 123, b'2']);
        assert!(err.is_none());
        assert_eq!(
            frames,
            vec![
                data(b"1"),
                TelnetFrame::Negotiate(NegotiationAction::Will, 123),
                data(b"2"),
            ]
        );
    }

    #[test]
    fn decode_all_actions() {
        for (byte, action) in [
            (consts::WILL, NegotiationAction::Will),
            (consts::WONT, NegotiationAction::Wont),
            (consts::DO, NegotiationAction::Do),
            (consts::DONT, NegotiationAction::Dont),
        ] {
            let (frames, err) = decode_all(&[consts::IAC, byte, 0x2C]);
            assert!(err.is_none());
            assert_eq!(frames, vec![TelnetFrame::Negotiate(action, 0x2C)]);
        }
    }

    // ------------------------------------------------------------------
    // Decoding - subnegotiation
    // ------------------------------------------------------------------

    #[test]
    fn decode_subnegotiation() {
        let (frames, err) = decode_all(&[
            b'1',
            consts::IAC,
            consts::SB,
            123,
            1,
            2,
            consts::IAC,
            consts::SE,
            b'2',
        ]);
        assert!(err.is_none());
        assert_eq!(
            frames,
            vec![
                data(b"1"),
                TelnetFrame::Subnegotiate(123, Bytes::from_static(&[1, 2])),
                data(b"2"),
            ]
        );
    }

    #[test]
    fn decode_subnegotiation_with_escaped_iac() {
        let (frames, err) = decode_all(&[
            b'1',
            consts::IAC,
            consts::SB,
            123,
            1,
            consts::IAC,
            consts::IAC,
            2,
            consts::IAC,
            consts::SE,
            b'2',
        ]);
        assert!(err.is_none());
        assert_eq!(
            frames,
            vec![
                data(b"1"),
                TelnetFrame::Subnegotiate(123, Bytes::from_static(&[1, 0xFF, 2])),
                data(b"2"),
            ]
        );
    }

    #[test]
    fn decode_subnegotiation_escape_before_payload() {
        // The escaped IAC lands right after the option code.
        let (frames, err) = decode_all(&[
            b'1',
            consts::IAC,
            consts::SB,
            123,
            consts::IAC,
            consts::IAC,
            2,
            consts::IAC,
            consts::SE,
            b'2',
        ]);
        assert!(err.is_none());
        assert_eq!(
            frames,
            vec![
                data(b"1"),
                TelnetFrame::Subnegotiate(123, Bytes::from_static(&[0xFF, 2])),
                data(b"2"),
            ]
        );
    }

    #[test]
    fn decode_subnegotiation_trailing_escape() {
        let (frames, err) = decode_all(&[
            b'1',
            consts::IAC,
            consts::SB,
            123,
            1,
            consts::IAC,
            consts::IAC,
            consts::IAC,
            consts::SE,
            b'2',
        ]);
        assert!(err.is_none());
        assert_eq!(
            frames,
            vec![
                data(b"1"),
                TelnetFrame::Subnegotiate(123, Bytes::from_static(&[1, 0xFF])),
                data(b"2"),
            ]
        );
    }

    #[test]
    fn decode_subnegotiation_escaped_iac_then_se_byte() {
        // IAC IAC unescapes to 0xFF, then a bare SE byte is payload, then
        // IAC SE terminates.
        let (frames, err) = decode_all(&[
            b'1',
            consts::IAC,
            consts::SB,
            123,
            1,
            consts::IAC,
            consts::IAC,
            consts::SE,
            consts::IAC,
            consts::SE,
            b'2',
        ]);
        assert!(err.is_none());
        assert_eq!(
            frames,
            vec![
                data(b"1"),
                TelnetFrame::Subnegotiate(123, Bytes::from_static(&[1, 0xFF, consts::SE])),
                data(b"2"),
            ]
        );
    }

    #[test]
    fn decode_subnegotiation_empty_payload_is_legal() {
        let (frames, err) = decode_all(&[consts::IAC, consts::SB, 0xE9, consts::IAC, consts::SE]);
        assert!(err.is_none());
        assert_eq!(frames, vec![TelnetFrame::Subnegotiate(0xE9, Bytes::new())]);
    }

    // ------------------------------------------------------------------
    // Decoding - protocol errors
    // ------------------------------------------------------------------

    #[test]
    fn decode_unexpected_se_fails() {
        let (frames, err) = decode_all(&[b'1', b'2', b'3', consts::IAC, consts::SE]);
        assert_eq!(frames, vec![data(b"123")]);
        assert_eq!(err, Some(CodecError::UnexpectedSe));
    }

    #[test]
    fn decode_bad_command_in_subnegotiation_fails() {
        let (frames, err) = decode_all(&[
            b'1',
            b'2',
            b'3',
            consts::IAC,
            consts::SB,
            b'1',
            consts::IAC,
            consts::SB,
        ]);
        assert_eq!(frames, vec![data(b"123")]);
        assert_eq!(err, Some(CodecError::BadSubnegotiationCommand(consts::SB)));
    }

    #[test]
    fn decode_empty_subnegotiation_fails() {
        let (frames, err) = decode_all(&[consts::IAC, consts::SB, consts::IAC, consts::SE]);
        assert!(frames.is_empty());
        assert_eq!(err, Some(CodecError::EmptySubnegotiation));
    }

    // ------------------------------------------------------------------
    // Decoding - partial input across feeds
    // ------------------------------------------------------------------

    #[test]
    fn decode_partial_negotiation_waits_for_more() {
        let mut codec = TelnetCodec::new();
        let mut src = BytesMut::from(&[consts::IAC, consts::DO][..]);
        assert_eq!(codec.decode(&mut src).unwrap(), None);
        src.put_u8(0x2C);
        assert_eq!(
            codec.decode(&mut src).unwrap(),
            Some(TelnetFrame::Negotiate(NegotiationAction::Do, 0x2C))
        );
    }

    #[test]
    fn decode_run_split_across_feeds() {
        let mut codec = TelnetCodec::new();
        let mut src = BytesMut::from(&b"12"[..]);
        assert_eq!(codec.decode(&mut src).unwrap(), Some(data(b"12")));
        src.extend_from_slice(b"3456");
        assert_eq!(codec.decode(&mut src).unwrap(), Some(data(b"3456")));
    }

    // ------------------------------------------------------------------
    // Encoding
    // ------------------------------------------------------------------

    #[test]
    fn encode_data_doubles_iac() {
        let dst = encode_all(vec![TelnetFrame::Data(Bytes::from_static(&[
            b'a',
            consts::IAC,
            b'b',
        ]))]);
        assert_eq!(&dst[..], &[b'a', consts::IAC, consts::IAC, b'b']);
    }

    #[test]
    fn encode_negotiation() {
        let dst = encode_all(vec![TelnetFrame::Negotiate(NegotiationAction::Dont, 0x03)]);
        assert_eq!(&dst[..], &[consts::IAC, consts::DONT, 0x03]);
    }

    #[test]
    fn encode_function() {
        let dst = encode_all(vec![TelnetFrame::Function(consts::BRK)]);
        assert_eq!(&dst[..], &[consts::IAC, consts::BRK]);
    }

    #[test]
    fn encode_subnegotiation_escapes_payload() {
        let dst = encode_all(vec![TelnetFrame::Subnegotiate(
            0xE8,
            Bytes::from_static(&[1, consts::IAC, 2]),
        )]);
        assert_eq!(
            &dst[..],
            &[
                consts::IAC,
                consts::SB,
                0xE8,
                1,
                consts::IAC,
                consts::IAC,
                2,
                consts::IAC,
                consts::SE,
            ]
        );
    }

    #[test]
    fn encode_then_decode_round_trips() {
        let frames = vec![
            data(b"hello"),
            TelnetFrame::Negotiate(NegotiationAction::Will, 0xE8),
            TelnetFrame::Subnegotiate(0xE8, Bytes::from_static(&[40, 0, 1, 0xFF, 7])),
            TelnetFrame::Function(consts::GA),
            data(&[0xFF]),
        ];
        let mut wire = encode_all(frames.clone());
        let mut codec = TelnetCodec::new();
        let mut decoded = Vec::new();
        while let Some(frame) = codec.decode(&mut wire).unwrap() {
            decoded.push(frame);
        }
        assert_eq!(decoded, frames);
    }
}
