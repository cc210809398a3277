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

//! Property tests: IAC escaping is an involution. Any frame sequence encoded
//! to the wire decodes back to an equivalent stream, and any raw in-band
//! payload survives a send/receive cycle byte-for-byte.

use bytes::{Bytes, BytesMut};
use proptest::prelude::*;
use tokio_util::codec::{Decoder, Encoder};
use vspc_telnetcodec::{NegotiationAction, TelnetCodec, TelnetFrame};

/// Collect every in-band byte from a decoded frame stream.
fn decode_inband(wire: &[u8]) -> Vec<u8> {
    let mut codec = TelnetCodec::new();
    let mut src = BytesMut::from(wire);
    let mut inband = Vec::new();
    while let Some(frame) = codec.decode(&mut src).expect("decode should not error") {
        if let TelnetFrame::Data(chunk) = frame {
            inband.extend_from_slice(&chunk);
        }
    }
    inband
}

proptest! {
    /// Sending arbitrary data (including 0xFF bytes) through the encoder and
    /// back through the decoder reproduces the input exactly.
    #[test]
    fn data_survives_escaping(payload in proptest::collection::vec(any::<u8>(), 0..512)) {
        let mut codec = TelnetCodec::new();
        let mut wire = BytesMut::new();
        codec
            .encode(TelnetFrame::Data(Bytes::from(payload.clone())), &mut wire)
            .expect("encode ok");
        prop_assert_eq!(decode_inband(&wire), payload);
    }

    /// Subnegotiation payloads survive escaping as well.
    #[test]
    fn subnegotiation_survives_escaping(
        option in any::<u8>(),
        payload in proptest::collection::vec(any::<u8>(), 0..256),
    ) {
        let mut codec = TelnetCodec::new();
        let mut wire = BytesMut::new();
        codec
            .encode(
                TelnetFrame::Subnegotiate(option, Bytes::from(payload.clone())),
                &mut wire,
            )
            .expect("encode ok");

        let mut decoder = TelnetCodec::new();
        let mut src = BytesMut::from(&wire[..]);
        let frame = decoder
            .decode(&mut src)
            .expect("decode ok")
            .expect("one frame");
        prop_assert_eq!(frame, TelnetFrame::Subnegotiate(option, Bytes::from(payload)));
        prop_assert!(src.is_empty());
    }

    /// A mixed frame sequence re-encodes from its decoded form to the exact
    /// original wire bytes.
    #[test]
    fn wire_reencodes_identically(
        runs in proptest::collection::vec(
            prop_oneof![
                proptest::collection::vec(any::<u8>(), 1..32).prop_map(FramePlan::Data),
                (any::<u8>()).prop_map(FramePlan::Negotiate),
                (any::<u8>(), proptest::collection::vec(any::<u8>(), 0..16))
                    .prop_map(|(o, p)| FramePlan::Subnegotiate(o, p)),
            ],
            0..16,
        )
    ) {
        let mut codec = TelnetCodec::new();
        let mut wire = BytesMut::new();
        for plan in &runs {
            codec.encode(plan.to_frame(), &mut wire).expect("encode ok");
        }

        let mut decoder = TelnetCodec::new();
        let mut src = BytesMut::from(&wire[..]);
        let mut reencoder = TelnetCodec::new();
        let mut rewire = BytesMut::new();
        while let Some(frame) = decoder.decode(&mut src).expect("decode ok") {
            reencoder.encode(frame, &mut rewire).expect("encode ok");
        }
        prop_assert_eq!(&wire[..], &rewire[..]);
    }
}

/// A generatable frame shape for the round-trip property.
#[derive(Debug, Clone)]
enum FramePlan {
    Data(Vec<u8>),
    Negotiate(u8),
    Subnegotiate(u8, Vec<u8>),
}

impl FramePlan {
    fn to_frame(&self) -> TelnetFrame {
        match self {
            FramePlan::Data(bytes) => TelnetFrame::Data(Bytes::from(bytes.clone())),
            FramePlan::Negotiate(option) => {
                TelnetFrame::Negotiate(NegotiationAction::Will, *option)
            }
            FramePlan::Subnegotiate(option, payload) => {
                TelnetFrame::Subnegotiate(*option, Bytes::from(payload.clone()))
            }
        }
    }
}
