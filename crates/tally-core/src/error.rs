use std::fmt;

/// Machine-readable error codes surfaced by the CLI and the sync layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    InputReadFailed,
    InvalidRowId,
    TaxonomyViolation,
    DuplicateRowId,
    UnknownEventType,
    MalformedPayload,
    MixedRowChanges,
    EmptyRowChanges,
    MisalignedActivation,
    OrderViolation,
    WriteRejected,
    InternalUnexpected,
}

impl ErrorCode {
    pub const ALL: [Self; 13] = [
        Self::ConfigParseError,
        Self::InputReadFailed,
        Self::InvalidRowId,
        Self::TaxonomyViolation,
        Self::DuplicateRowId,
        Self::UnknownEventType,
        Self::MalformedPayload,
        Self::MixedRowChanges,
        Self::EmptyRowChanges,
        Self::MisalignedActivation,
        Self::OrderViolation,
        Self::WriteRejected,
        Self::InternalUnexpected,
    ];

    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::InputReadFailed => "E1002",
            Self::InvalidRowId => "E2001",
            Self::TaxonomyViolation => "E2002",
            Self::DuplicateRowId => "E2003",
            Self::UnknownEventType => "E3001",
            Self::MalformedPayload => "E3002",
            Self::MixedRowChanges => "E3003",
            Self::EmptyRowChanges => "E3004",
            Self::MisalignedActivation => "E3005",
            Self::OrderViolation => "E4001",
            Self::WriteRejected => "E5001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::InputReadFailed => "Input file could not be read",
            Self::InvalidRowId => "Invalid row id",
            Self::TaxonomyViolation => "Row does not fit the row taxonomy",
            Self::DuplicateRowId => "Duplicate row id",
            Self::UnknownEventType => "Unknown event type",
            Self::MalformedPayload => "Event payload does not match its type",
            Self::MixedRowChanges => "Row changes target different rows",
            Self::EmptyRowChanges => "No row changes to merge",
            Self::MisalignedActivation => "Placeholder activation lists differ in length",
            Self::OrderViolation => "Row order invariant violated",
            Self::WriteRejected => "Server rejected the write",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .tally/config.toml and retry."),
            Self::InputReadFailed => Some("Check the path and file permissions."),
            Self::InvalidRowId => Some(
                "Use a positive integer, placeholder-<token>, group-<n> or markup-<n>.",
            ),
            Self::TaxonomyViolation => {
                Some("Make rowType agree with the id: model, placeholder, group or markup.")
            }
            Self::DuplicateRowId => None,
            Self::UnknownEventType => Some("Use one of the event types listed by `tally replay --help`."),
            Self::MalformedPayload => None,
            Self::MixedRowChanges => Some("Consolidate changes per row id before merging."),
            Self::EmptyRowChanges => None,
            Self::MisalignedActivation => {
                Some("Send one model per placeholder id, in the same order.")
            }
            Self::OrderViolation => Some("Run `tally replay` to rebuild the collection from events."),
            Self::WriteRejected => Some("The local change was rolled back; retry the edit."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
