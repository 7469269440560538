//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: scripts rely on them.
//!
//! | Code | Meaning                                                     |
//! |------|-------------------------------------------------------------|
//! | 0    | Success                                                     |
//! | 1    | General error (unspecified)                                 |
//! | 2    | Usage error (bad args, missing file, bad config)            |
//! | 3    | Upload rejected (type, extension, size)                     |
//! | 4    | Upload could not be parsed as a spreadsheet                 |
//! | 5    | Required columns missing for the chosen layout              |
//! | 6    | No row survived the layout filters                          |
//! | 7    | Partial persistence (at least one chunk was not written)    |
//! | 8    | Unmatched site names present (`--fail-on-unmatched`)       |
//! | 9    | Enrollment store or site registry unavailable               |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into `exit_code_for` or the command that raises it

use roster_ingest::ErrorKind;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unreadable input path, invalid config.
pub const EXIT_USAGE: u8 = 2;

/// The upload failed the type gate (media type, extension or size).
pub const EXIT_INVALID_FILE: u8 = 3;

/// The upload passed the type gate but is not a readable workbook, or has no
/// data rows.
pub const EXIT_MALFORMED_FILE: u8 = 4;

/// Required columns of the chosen layout are absent.
pub const EXIT_MISSING_COLUMNS: u8 = 5;

/// Every row was filtered out.
pub const EXIT_NO_VALID_ROWS: u8 = 6;

/// The run finished but one or more chunks failed to commit.
/// Rows of committed chunks stay persisted.
pub const EXIT_PARTIAL_PERSIST: u8 = 7;

/// Some site names resolved to nothing and `--fail-on-unmatched` was given.
pub const EXIT_UNMATCHED_SITES: u8 = 8;

/// The enrollment store or site registry could not be opened or queried.
pub const EXIT_STORE: u8 = 9;

/// Map a pipeline failure to its exit code.
pub fn exit_code_for(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::InvalidFile => EXIT_INVALID_FILE,
        ErrorKind::MalformedFile => EXIT_MALFORMED_FILE,
        ErrorKind::MissingColumns => EXIT_MISSING_COLUMNS,
        ErrorKind::NoValidRows => EXIT_NO_VALID_ROWS,
        ErrorKind::Config => EXIT_USAGE,
        ErrorKind::Registry | ErrorKind::Store => EXIT_STORE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_ERROR,
            EXIT_USAGE,
            EXIT_INVALID_FILE,
            EXIT_MALFORMED_FILE,
            EXIT_MISSING_COLUMNS,
            EXIT_NO_VALID_ROWS,
            EXIT_PARTIAL_PERSIST,
            EXIT_UNMATCHED_SITES,
            EXIT_STORE,
        ];
        let mut sorted = codes.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), codes.len());
    }

    #[test]
    fn test_every_error_kind_has_a_specific_code() {
        for kind in [
            ErrorKind::InvalidFile,
            ErrorKind::MalformedFile,
            ErrorKind::MissingColumns,
            ErrorKind::NoValidRows,
            ErrorKind::Config,
            ErrorKind::Registry,
            ErrorKind::Store,
        ] {
            assert_ne!(exit_code_for(kind), EXIT_ERROR, "{kind}");
            assert_ne!(exit_code_for(kind), EXIT_SUCCESS, "{kind}");
        }
    }
}
