//! The three-message sync protocol layered on top of the update codec
//!. The core doesn't frame messages or open a transport —
//! only the discriminator-plus-payload encoding a provider wires up.

use crate::block_store::StateVector;
use crate::update::Update;
use lib0::decoding::{Cursor, Read};
use lib0::encoding::Write;
use lib0::Error as Lib0Error;

const STEP1: u64 = 0;
const STEP2: u64 = 1;
const UPDATE: u64 = 2;

/// One message of the sync exchange. The discriminator is a `varUint`
///, followed by the appropriate payload.
pub enum SyncMessage {
    /// Sender announces what it has; the receiver replies with `SyncStep2`
    /// carrying whatever the sender's state vector says it's missing.
    SyncStep1(StateVector),
    /// An update satisfying a prior `SyncStep1`, applied directly on receipt.
    SyncStep2(Update),
    /// An incremental broadcast from the update's originator.
    Update(Update),
}

impl SyncMessage {
    pub fn encode_v1(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            SyncMessage::SyncStep1(sv) => {
                buf.write_var(STEP1);
                sv.encode(&mut buf);
            }
            SyncMessage::SyncStep2(update) => {
                buf.write_var(STEP2);
                buf.write_buf(&update.encode_v1());
            }
            SyncMessage::Update(update) => {
                buf.write_var(UPDATE);
                buf.write_buf(&update.encode_v1());
            }
        }
        buf
    }

    pub fn decode_v1(bytes: &[u8]) -> Result<SyncMessage, Lib0Error> {
        let mut cursor = Cursor::new(bytes);
        let tag: u64 = cursor.read_var()?;
        match tag {
            STEP1 => Ok(SyncMessage::SyncStep1(StateVector::decode(&mut cursor)?)),
            STEP2 => Ok(SyncMessage::SyncStep2(Update::decode_v1(cursor.read_buf()?)?)),
            UPDATE => Ok(SyncMessage::Update(Update::decode_v1(cursor.read_buf()?)?)),
            _ => Err(Lib0Error::UnexpectedValue),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::doc::Doc;

    #[test]
    fn sync_step1_roundtrips_a_state_vector() {
        let doc = Doc::with_client_id(7);
        let text = doc.get_or_insert_text("t");
        {
            let mut txn = doc.transact_mut();
            text.insert(&mut txn, 0, "hi");
        }
        let msg = SyncMessage::SyncStep1(doc.transact().state_vector());
        let bytes = msg.encode_v1();
        match SyncMessage::decode_v1(&bytes).unwrap() {
            SyncMessage::SyncStep1(sv) => assert_eq!(sv.get(&7), 2),
            _ => panic!("expected SyncStep1"),
        }
    }

    #[test]
    fn full_client_server_handshake_converges() {
        let server = Doc::with_client_id(1);
        let server_text = server.get_or_insert_text("t");
        {
            let mut txn = server.transact_mut();
            server_text.insert(&mut txn, 0, "server-side");
        }

        let client = Doc::with_client_id(2);

        // client -> server: SyncStep1
        let step1 = SyncMessage::SyncStep1(client.transact().state_vector());
        let step1_bytes = step1.encode_v1();

        // server replies with SyncStep2 (diff against client's state) plus its own SyncStep1
        let SyncMessage::SyncStep1(client_sv) = SyncMessage::decode_v1(&step1_bytes).unwrap() else {
            unreachable!()
        };
        let step2 = SyncMessage::SyncStep2(server.encode_state_as_update(&client_sv));
        let step2_bytes = step2.encode_v1();

        // client applies SyncStep2
        let SyncMessage::SyncStep2(update) = SyncMessage::decode_v1(&step2_bytes).unwrap() else {
            unreachable!()
        };
        client.transact_mut().apply_update(update);

        let client_text = client.get_or_insert_text("t");
        assert_eq!(client_text.to_string(), "server-side");
    }
}
