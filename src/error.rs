// MIT License - Copyright (c) 2026 Peter Wright

/// All errors that can occur in the alarm engine.
#[derive(Debug, thiserror::Error)]
pub enum AlarmError {
    #[error("duplicate zone id: {id}")]
    DuplicateZone { id: String },

    #[error("zone {id} has unknown kind {kind:?} (expected \"motion\" or \"contact\")")]
    UnknownZoneKind { id: String, kind: String },

    #[error("zone {id} has negative entry delay: {seconds}s")]
    NegativeEntryDelay { id: String, seconds: i64 },

    #[error("zone has empty id")]
    EmptyZoneId,

    #[error("state store I/O error: {0}")]
    StoreIo(#[from] std::io::Error),

    #[error("state record encode error: {0}")]
    StoreEncode(#[from] serde_json::Error),

    #[error("unrecognized sensor payload: {payload:?}")]
    InvalidPayload { payload: String },

    #[error("controller channel closed")]
    ChannelClosed,
}

impl AlarmError {
    /// Whether this error must abort startup. Only configuration errors are
    /// fatal; everything else is contained where it is detected and logged.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AlarmError::DuplicateZone { .. }
                | AlarmError::UnknownZoneKind { .. }
                | AlarmError::NegativeEntryDelay { .. }
                | AlarmError::EmptyZoneId
        )
    }
}

pub type Result<T> = std::result::Result<T, AlarmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_are_fatal() {
        assert!(AlarmError::DuplicateZone { id: "AABB".into() }.is_fatal());
        assert!(
            AlarmError::UnknownZoneKind {
                id: "AABB".into(),
                kind: "laser".into()
            }
            .is_fatal()
        );
        assert!(
            AlarmError::NegativeEntryDelay {
                id: "AABB".into(),
                seconds: -5
            }
            .is_fatal()
        );
        assert!(AlarmError::EmptyZoneId.is_fatal());
    }

    #[test]
    fn runtime_errors_are_not_fatal() {
        assert!(!AlarmError::ChannelClosed.is_fatal());
        assert!(
            !AlarmError::InvalidPayload {
                payload: "banana".into()
            }
            .is_fatal()
        );
        let io = AlarmError::StoreIo(std::io::Error::other("disk"));
        assert!(!io.is_fatal());
    }
}
