use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;

use super::types::Message;
use crate::ddll::Link;
use crate::error::Error;
use crate::error::Result;

/// A [Message] addressed to a single list member.
///
/// A peer may host members of several lists, so the target is a full
/// [Link] and not only an endpoint.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MessagePayload {
    /// The member that sent the message.
    pub sender: Link,
    /// The member the message is for.
    pub target: Link,
    /// The message.
    pub message: Message,
}

impl MessagePayload {
    pub fn new(sender: Link, target: Link, message: Message) -> Self {
        Self {
            sender,
            target,
            message,
        }
    }

    /// Encode with bincode for the wire.
    pub fn to_bytes(&self) -> Result<Bytes> {
        bincode::serialize(self)
            .map(Bytes::from)
            .map_err(Error::BincodeSerialize)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(Error::BincodeDeserialize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ddll::link::tests::link;
    use crate::ddll::LinkNum;
    use crate::message::SetR;
    use crate::message::SetRKind;

    #[test]
    fn test_payload_bytes() {
        let payload = MessagePayload::new(
            link(3),
            link(1),
            Message::SetR(SetR {
                req: 9,
                r_new: link(3),
                r_cur: link(5),
                r_new_seq: LinkNum::new(1, 2),
                kind: SetRKind::Repair {
                    suspected: vec![link(2)],
                },
            }),
        );
        let bytes = payload.to_bytes().unwrap();
        let decoded = MessagePayload::from_bytes(&bytes).unwrap();
        assert!(decoded.sender.is_identical(&payload.sender));
        assert!(decoded.target.is_identical(&payload.target));
        match decoded.message {
            Message::SetR(m) => {
                assert_eq!(m.req, 9);
                assert_eq!(m.r_new_seq, LinkNum::new(1, 2));
                assert_eq!(m.kind, SetRKind::Repair {
                    suspected: vec![link(2)]
                });
            }
            other => panic!("unexpected {other}"),
        }
        assert!(MessagePayload::from_bytes(&bytes[..3]).is_err());
    }
}
