//! Property-based tests over the codec and connection surfaces.

use proptest::prelude::*;

use wscore::extensions::deflate::{DeflateConfig, PerMessageDeflate};
use wscore::extensions::Extension;
use wscore::protocol::mask::{apply_mask, apply_mask_offset};
use wscore::protocol::{FrameDecoder, FrameEncoder, OpCode};
use wscore::{BytesMessage, Config, Connection, Event, Result, Role, TextMessage};

fn data_opcode_strategy() -> impl Strategy<Value = OpCode> {
    prop_oneof![Just(OpCode::Text), Just(OpCode::Binary)]
}

fn collect_events(connection: &mut Connection) -> Vec<Event> {
    connection
        .events()
        .collect::<Result<Vec<_>>>()
        .expect("stream is valid")
}

/// Concatenate the data payloads of a message event stream.
fn concat_data(events: &[Event]) -> Vec<u8> {
    let mut out = Vec::new();
    for event in events {
        match event {
            Event::Text(m) => out.extend_from_slice(m.data.as_bytes()),
            Event::Bytes(m) => out.extend_from_slice(&m.data),
            other => panic!("unexpected event {other:?}"),
        }
    }
    out
}

proptest! {
    // Any frame the encoder produces, the decoder reads back verbatim.
    #[test]
    fn roundtrip_unmasked(
        opcode in data_opcode_strategy(),
        payload in prop::collection::vec(any::<u8>(), 0..2048)
    ) {
        let mut encoder = FrameEncoder::with_seed(Role::Server, 1);
        let wire = encoder.serialize(true, Default::default(), opcode, &payload);

        let mut decoder = FrameDecoder::new(Role::Client, usize::MAX);
        let mut extensions: Vec<Box<dyn Extension>> = Vec::new();
        decoder.receive_bytes(&wire);

        let mut collected = Vec::new();
        let mut finished = false;
        while let Some(chunk) = decoder.next_frame(&mut extensions).unwrap() {
            collected.extend(chunk.payload);
            finished = chunk.frame_finished;
        }
        prop_assert!(finished);
        prop_assert_eq!(collected, payload);
    }

    // Masked frames survive the same trip; masking is invisible above the
    // codec.
    #[test]
    fn roundtrip_masked(
        seed in any::<u32>(),
        payload in prop::collection::vec(any::<u8>(), 0..2048)
    ) {
        let mut encoder = FrameEncoder::with_seed(Role::Client, seed);
        let wire = encoder.serialize(true, Default::default(), OpCode::Binary, &payload);

        let mut decoder = FrameDecoder::new(Role::Server, usize::MAX);
        let mut extensions: Vec<Box<dyn Extension>> = Vec::new();
        decoder.receive_bytes(&wire);

        let mut collected = Vec::new();
        while let Some(chunk) = decoder.next_frame(&mut extensions).unwrap() {
            collected.extend(chunk.payload);
        }
        prop_assert_eq!(collected, payload);
    }

    // XOR masking is its own inverse for any key and payload.
    #[test]
    fn masking_is_self_inverse(
        key in any::<[u8; 4]>(),
        data in prop::collection::vec(any::<u8>(), 0..512),
        offset in 0usize..8
    ) {
        let mut masked = data.clone();
        apply_mask_offset(&mut masked, key, offset);
        apply_mask_offset(&mut masked, key, offset);
        prop_assert_eq!(masked, data.clone());

        let mut once = data.clone();
        apply_mask(&mut once, key);
        for (i, byte) in once.iter().enumerate() {
            prop_assert_eq!(*byte, data[i] ^ key[i % 4]);
        }
    }

    // Splitting the inbound stream at arbitrary points never changes the
    // reassembled bytes.
    #[test]
    fn chunked_feeding_is_equivalent(
        payload in prop::collection::vec(any::<u8>(), 1..1024),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..8)
    ) {
        let mut encoder = FrameEncoder::with_seed(Role::Client, 7);
        let wire = encoder.serialize(true, Default::default(), OpCode::Binary, &payload);

        let mut whole = Connection::new(Role::Server, Vec::new(), Config::default());
        whole.receive_data(Some(&wire)).unwrap();
        let expected = concat_data(&collect_events(&mut whole));

        let mut positions: Vec<usize> = cuts.iter().map(|i| i.index(wire.len())).collect();
        positions.sort_unstable();
        positions.dedup();

        let mut split = Connection::new(Role::Server, Vec::new(), Config::default());
        let mut collected = Vec::new();
        let mut start = 0;
        for cut in positions.into_iter().chain(std::iter::once(wire.len())) {
            if cut > start {
                split.receive_data(Some(&wire[start..cut])).unwrap();
                collected.extend(concat_data(&collect_events(&mut split)));
                start = cut;
            }
        }
        prop_assert_eq!(collected, expected);
    }

    // A valid UTF-8 text message split across any frame boundaries is
    // delivered intact, even when a codepoint straddles the cut.
    #[test]
    fn utf8_survives_any_fragmentation(
        text in "\\PC{0,64}",
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..4)
    ) {
        let bytes = text.as_bytes();
        let mut positions: Vec<usize> = cuts.iter().map(|i| i.index(bytes.len() + 1)).collect();
        positions.sort_unstable();
        positions.dedup();

        let mut encoder = FrameEncoder::with_seed(Role::Client, 3);
        let mut wire = Vec::new();
        let mut start = 0;
        let mut fragments = Vec::new();
        for cut in positions.into_iter().chain(std::iter::once(bytes.len())) {
            if cut > start || fragments.is_empty() {
                fragments.push(&bytes[start..cut.max(start)]);
                start = cut.max(start);
            }
        }
        for (i, fragment) in fragments.iter().enumerate() {
            let opcode = if i == 0 { OpCode::Text } else { OpCode::Continuation };
            let fin = i == fragments.len() - 1;
            wire.extend(encoder.serialize(fin, Default::default(), opcode, fragment));
        }

        let mut server = Connection::new(Role::Server, Vec::new(), Config::default());
        server.receive_data(Some(&wire)).unwrap();
        let events = collect_events(&mut server);
        let mut collected = String::new();
        for event in &events {
            match event {
                Event::Text(m) => collected.push_str(&m.data),
                other => panic!("unexpected event {other:?}"),
            }
        }
        prop_assert_eq!(collected, text);
    }

    // Messages survive compression with identical negotiated parameters on
    // both ends, across repeated messages (shared context).
    #[test]
    fn deflate_roundtrip(
        messages in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..512), 1..4)
    ) {
        let mut client_ext = PerMessageDeflate::new(DeflateConfig::default());
        client_ext.finalize(&[]).unwrap();
        let mut server_ext = PerMessageDeflate::new(DeflateConfig::default());
        server_ext.finalize(&[]).unwrap();

        let mut client = Connection::new(Role::Client, vec![Box::new(client_ext)], Config::default());
        let mut server = Connection::new(Role::Server, vec![Box::new(server_ext)], Config::default());

        for message in &messages {
            let wire = client
                .send(Event::Bytes(BytesMessage::new(message.clone())))
                .unwrap();
            server.receive_data(Some(&wire)).unwrap();
            let events = collect_events(&mut server);
            prop_assert_eq!(concat_data(&events), message.clone());
        }
    }

    // Outbound text serialization round-trips through a peer connection.
    #[test]
    fn text_send_receive_roundtrip(text in "\\PC{0,256}") {
        let mut client = Connection::new(Role::Client, Vec::new(), Config::default());
        client.reseed_mask(5);
        let wire = client.send(Event::Text(TextMessage::new(text.clone()))).unwrap();

        let mut server = Connection::new(Role::Server, Vec::new(), Config::default());
        server.receive_data(Some(&wire)).unwrap();
        let events = collect_events(&mut server);
        let mut collected = String::new();
        for event in &events {
            match event {
                Event::Text(m) => collected.push_str(&m.data),
                other => panic!("unexpected event {other:?}"),
            }
        }
        prop_assert_eq!(collected, text);
    }
}
