use serde::{Deserialize, Serialize};

/// The six relay event classes of spec §6. Wire representation is an
/// integer "kind" code plus a content string and tag list, matching how
/// Nostr events are shaped — grounded on `nostr = { features = ["nip44"] }`
/// in `lexe-app-lexe-public` and `nostr_sdk::prelude::*` in
/// `Resolvr-io-deadcat`'s `commands.rs`.
///
/// Custom (parameterized-replaceable-adjacent) kind range, chosen to avoid
/// colliding with any NIP-defined kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// user -> gateway, public
    Intent,
    /// gateway -> wallet, direct message
    SigningChallenge,
    /// wallet -> gateway, direct message
    SigningResponse,
    /// gateway -> public
    Confirmation,
    /// gateway -> wallet, direct message
    Failure,
    /// gateway -> public
    L1Commitment,
    /// any other kind code this gateway doesn't natively classify
    Other(u16),
}

impl EventKind {
    pub const INTENT_CODE: u16 = 31_500;
    pub const SIGNING_CHALLENGE_CODE: u16 = 31_501;
    pub const SIGNING_RESPONSE_CODE: u16 = 31_502;
    pub const CONFIRMATION_CODE: u16 = 31_503;
    pub const FAILURE_CODE: u16 = 31_504;
    pub const L1_COMMITMENT_CODE: u16 = 31_505;

    pub fn code(self) -> u16 {
        match self {
            EventKind::Intent => Self::INTENT_CODE,
            EventKind::SigningChallenge => Self::SIGNING_CHALLENGE_CODE,
            EventKind::SigningResponse => Self::SIGNING_RESPONSE_CODE,
            EventKind::Confirmation => Self::CONFIRMATION_CODE,
            EventKind::Failure => Self::FAILURE_CODE,
            EventKind::L1Commitment => Self::L1_COMMITMENT_CODE,
            EventKind::Other(code) => code,
        }
    }

    pub fn from_code(code: u16) -> Self {
        match code {
            Self::INTENT_CODE => EventKind::Intent,
            Self::SIGNING_CHALLENGE_CODE => EventKind::SigningChallenge,
            Self::SIGNING_RESPONSE_CODE => EventKind::SigningResponse,
            Self::CONFIRMATION_CODE => EventKind::Confirmation,
            Self::FAILURE_CODE => EventKind::Failure,
            Self::L1_COMMITMENT_CODE => EventKind::L1Commitment,
            other => EventKind::Other(other),
        }
    }

    /// Direct-message classes require NIP-04/NIP-44 decryption before the
    /// dispatcher ever sees their content.
    pub fn is_direct_message(self) -> bool {
        matches!(self, EventKind::SigningChallenge | EventKind::SigningResponse | EventKind::Failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_round_trips() {
        for kind in [
            EventKind::Intent,
            EventKind::SigningChallenge,
            EventKind::SigningResponse,
            EventKind::Confirmation,
            EventKind::Failure,
            EventKind::L1Commitment,
        ] {
            assert_eq!(EventKind::from_code(kind.code()).code(), kind.code());
        }
    }
}
