use serde::{Deserialize, Serialize};

/// Offset that folds channel ids into the negative "marked" id space.
const CHANNEL_ID_OFFSET: i64 = 1_000_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
/// Tagged union over the peer representations the transport can hand back.
///
/// Produced once at the adapter boundary; everything downstream works with
/// this union or the canonical marked integer id.
pub enum PeerRef {
    /// Broadcast channel or supergroup, by bare (unmarked) id.
    Channel(i64),
    /// Legacy small group, by bare id.
    Group(i64),
    /// User / private chat.
    User(i64),
    /// Already-canonical id whose kind is unknown.
    Raw(i64),
}

/// Collapses a peer into the canonical marked chat-id scheme: users keep
/// their positive id, legacy groups are negated, channels are folded below
/// `-10^12`.
pub fn canonical_chat_id(peer: PeerRef) -> i64 {
    match peer {
        PeerRef::User(id) => id,
        PeerRef::Group(id) => -id,
        PeerRef::Channel(id) => -CHANNEL_ID_OFFSET - id,
        PeerRef::Raw(id) => id,
    }
}

/// Recovers the tagged peer from a canonical marked id.
pub fn peer_from_canonical(marked: i64) -> PeerRef {
    if marked > 0 {
        PeerRef::User(marked)
    } else if marked <= -CHANNEL_ID_OFFSET {
        PeerRef::Channel(-(marked + CHANNEL_ID_OFFSET))
    } else {
        PeerRef::Group(-marked)
    }
}

/// Returns the bare channel id when `marked` denotes a channel, used to
/// build `t.me/c/...` deep links.
pub fn channel_internal_id(marked: i64) -> Option<i64> {
    match peer_from_canonical(marked) {
        PeerRef::Channel(id) if id > 0 => Some(id),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_canonical_chat_id_marks_each_kind() {
        assert_eq!(canonical_chat_id(PeerRef::User(42)), 42);
        assert_eq!(canonical_chat_id(PeerRef::Group(9)), -9);
        assert_eq!(
            canonical_chat_id(PeerRef::Channel(1_234_567_890)),
            -1_001_234_567_890
        );
        assert_eq!(canonical_chat_id(PeerRef::Raw(-77)), -77);
    }

    #[test]
    fn unit_peer_from_canonical_inverts_marking() {
        for peer in [
            PeerRef::User(42),
            PeerRef::Group(9),
            PeerRef::Channel(1_234_567_890),
        ] {
            assert_eq!(peer_from_canonical(canonical_chat_id(peer)), peer);
        }
    }

    #[test]
    fn unit_channel_internal_id_only_for_channels() {
        assert_eq!(channel_internal_id(-1_001_234_567_890), Some(1_234_567_890));
        assert_eq!(channel_internal_id(-9), None);
        assert_eq!(channel_internal_id(42), None);
    }
}
