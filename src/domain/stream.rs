use serde::{Deserialize, Serialize};

/// The four reader flavors: live tail vs historical walk, all moderators vs
/// the platform-admin subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    Stream,
    AdminStream,
    Backlog,
    AdminBacklog,
}

impl StreamKind {
    pub const ALL: [StreamKind; 4] = [
        StreamKind::Stream,
        StreamKind::AdminStream,
        StreamKind::Backlog,
        StreamKind::AdminBacklog,
    ];

    pub fn is_live(&self) -> bool {
        matches!(self, StreamKind::Stream | StreamKind::AdminStream)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, StreamKind::AdminStream | StreamKind::AdminBacklog)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Stream => "stream",
            StreamKind::AdminStream => "admin_stream",
            StreamKind::Backlog => "backlog",
            StreamKind::AdminBacklog => "admin_backlog",
        }
    }
}

/// Dispatch priority, highest first: live admin actions beat live ordinary
/// actions beat anything from a backlog walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    BacklogOrdinary,
    BacklogAdmin,
    LiveOrdinary,
    LiveAdmin,
}

impl Priority {
    pub fn for_unit(live: bool, admin: bool) -> Self {
        match (live, admin) {
            (true, true) => Priority::LiveAdmin,
            (true, false) => Priority::LiveOrdinary,
            (false, true) => Priority::BacklogAdmin,
            (false, false) => Priority::BacklogOrdinary,
        }
    }

    /// Integer level, higher = more urgent.
    pub fn level(&self) -> u8 {
        match self {
            Priority::LiveAdmin => 3,
            Priority::LiveOrdinary => 2,
            Priority::BacklogAdmin => 1,
            Priority::BacklogOrdinary => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_flags() {
        assert!(StreamKind::Stream.is_live());
        assert!(StreamKind::AdminStream.is_live());
        assert!(!StreamKind::Backlog.is_live());
        assert!(StreamKind::AdminBacklog.is_admin());
        assert!(!StreamKind::Backlog.is_admin());
    }

    #[test]
    fn priority_ordering_live_admin_first() {
        let mut levels: Vec<u8> = [
            Priority::for_unit(true, true),
            Priority::for_unit(true, false),
            Priority::for_unit(false, true),
            Priority::for_unit(false, false),
        ]
        .iter()
        .map(Priority::level)
        .collect();
        levels.sort_unstable();
        assert_eq!(levels, vec![0, 1, 2, 3]);
        assert!(Priority::LiveAdmin > Priority::LiveOrdinary);
        assert!(Priority::LiveOrdinary > Priority::BacklogAdmin);
        assert!(Priority::BacklogAdmin > Priority::BacklogOrdinary);
    }
}
