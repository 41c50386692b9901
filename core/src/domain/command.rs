// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Command whitelist & typed-hole validation (spec §4.1).
//!
//! This module is pure — no process spawning, no filesystem access.
//! It only answers "is this (head, argv) invocation one the system is
//! willing to run", the same separation of policy from enforcement the
//! security-context capability model uses: a capability decides what is
//! allowed, a runtime decides how it executes.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// A typed hole from the table in spec §4.1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hole {
    PoolName,
    Dataset,
    Snapshot,
    DeviceById,
    MountPoint,
    Permission,
    PosixName,
    Url,
    /// A `property=value` token as accepted by `zfs set`, e.g.
    /// `compression=lz4`.
    PropertyAssignment,
    /// A fixed set of literal alternatives, e.g. `<enum:pause|unpause>`.
    Enum(&'static [&'static str]),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HoleError {
    #[error("value does not match hole shape")]
    Shape,
    #[error("value exceeds maximum length")]
    TooLong,
}

static POOL_NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_.\-]{0,254}$").unwrap());
static SEGMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_.\-]{0,254}$").unwrap());
static SNAPSHOT_NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").unwrap());
static POSIX_NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.\-]{0,31}$").unwrap());
static PERMISSION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-7]{3,4}$").unwrap());
static PROPERTY_ASSIGNMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_:]{0,63}=[A-Za-z0-9_.\-]{0,64}$").unwrap());

impl Hole {
    pub fn validate(&self, value: &str) -> Result<(), HoleError> {
        match self {
            Hole::PoolName => {
                if value.len() > 255 {
                    return Err(HoleError::TooLong);
                }
                require(POOL_NAME_RE.is_match(value))
            }
            Hole::Dataset => {
                if value.len() > 255 {
                    return Err(HoleError::TooLong);
                }
                require(value.split('/').all(|seg| SEGMENT_RE.is_match(seg)))
            }
            Hole::Snapshot => {
                let (dataset, name) = value.split_once('@').ok_or(HoleError::Shape)?;
                Hole::Dataset.validate(dataset)?;
                require(SNAPSHOT_NAME_RE.is_match(name))
            }
            Hole::DeviceById => {
                let path = Path::new(value);
                require(
                    value.starts_with("/dev/disk/by-id/")
                        && path.components().all(|c| !matches!(
                            c,
                            std::path::Component::ParentDir | std::path::Component::CurDir
                        )),
                )
            }
            Hole::MountPoint => {
                let path = Path::new(value);
                require(
                    (value.starts_with("/mnt/") || value.starts_with("/media/"))
                        && path.components().all(|c| !matches!(
                            c,
                            std::path::Component::ParentDir | std::path::Component::CurDir
                        )),
                )
            }
            Hole::Permission => require(PERMISSION_RE.is_match(value)),
            Hole::PosixName => require(POSIX_NAME_RE.is_match(value)),
            Hole::PropertyAssignment => require(PROPERTY_ASSIGNMENT_RE.is_match(value)),
            Hole::Url => {
                let ok = if let Some(rest) = value.strip_prefix("git@") {
                    rest.contains(':')
                } else {
                    url::Url::parse(value)
                        .map(|u| matches!(u.scheme(), "https" | "http" | "git" | "ssh"))
                        .unwrap_or(false)
                };
                require(ok)
            }
            Hole::Enum(options) => require(options.contains(&value)),
        }
    }
}

fn require(cond: bool) -> Result<(), HoleError> {
    if cond {
        Ok(())
    } else {
        Err(HoleError::Shape)
    }
}

/// One argv position: either a fixed literal or a typed hole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgvPattern {
    Literal(&'static str),
    Hole(Hole),
    /// Zero or more trailing positions matching `Hole`, e.g. the
    /// device list in `zpool create <pool> mirror <device>...`.
    Variadic(Hole),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutClass {
    /// <= 5s — listings, status.
    Fast,
    /// <= 10min — scrub, send/recv.
    Slow,
}

impl TimeoutClass {
    pub fn duration(&self) -> std::time::Duration {
        match self {
            TimeoutClass::Fast => std::time::Duration::from_secs(5),
            TimeoutClass::Slow => std::time::Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WhitelistEntry {
    pub head: &'static str,
    pub argv: Vec<ArgvPattern>,
    pub timeout_class: TimeoutClass,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WhitelistError {
    #[error("no whitelist entry for executable {0}")]
    NotWhitelisted(String),
    #[error("argv arity mismatch: expected {expected}, got {got}")]
    Arity { expected: usize, got: usize },
    #[error("argument at position {position} failed validation: {reason}")]
    InvalidArg { position: usize, reason: String },
}

/// Static table of allowed `(head, argv pattern, timeout class)`
/// entries. Mutating this requires a code change, not data — the
/// per-invocation property tested in spec §8.
pub struct Whitelist {
    entries: Vec<WhitelistEntry>,
}

impl Whitelist {
    pub fn standard() -> Self {
        use ArgvPattern::*;
        use TimeoutClass::*;
        use self::Hole::*;

        let entries = vec![
            WhitelistEntry {
                head: "zpool",
                argv: vec![Literal("list"), Literal("-H"), Literal("-p"), Literal("-o"), Literal("name,size,alloc,health")],
                timeout_class: Fast,
            },
            WhitelistEntry {
                head: "zpool",
                argv: vec![Literal("status"), Hole(PoolName)],
                timeout_class: Fast,
            },
            WhitelistEntry {
                head: "zpool",
                argv: vec![Literal("create"), Hole(PoolName), Literal("mirror"), Variadic(DeviceById)],
                timeout_class: Slow,
            },
            WhitelistEntry {
                head: "zpool",
                argv: vec![Literal("create"), Hole(PoolName), Variadic(DeviceById)],
                timeout_class: Slow,
            },
            WhitelistEntry {
                head: "zpool",
                argv: vec![Literal("create"), Hole(PoolName), Literal("raidz1"), Variadic(DeviceById)],
                timeout_class: Slow,
            },
            WhitelistEntry {
                head: "zpool",
                argv: vec![Literal("create"), Hole(PoolName), Literal("raidz2"), Variadic(DeviceById)],
                timeout_class: Slow,
            },
            WhitelistEntry {
                head: "zpool",
                argv: vec![Literal("create"), Hole(PoolName), Literal("raidz3"), Variadic(DeviceById)],
                timeout_class: Slow,
            },
            WhitelistEntry {
                head: "zpool",
                argv: vec![Literal("destroy"), Literal("-f"), Hole(PoolName)],
                timeout_class: Slow,
            },
            WhitelistEntry {
                head: "zpool",
                argv: vec![Literal("scrub"), Hole(PoolName)],
                timeout_class: Slow,
            },
            WhitelistEntry {
                head: "zfs",
                argv: vec![
                    Literal("list"),
                    Literal("-H"),
                    Literal("-p"),
                    Literal("-t"),
                    Literal("filesystem"),
                    Literal("-o"),
                    Literal("name,used,quota,compression,recordsize,encryption"),
                ],
                timeout_class: Fast,
            },
            WhitelistEntry {
                head: "zfs",
                argv: vec![Literal("create"), Hole(Dataset)],
                timeout_class: Fast,
            },
            WhitelistEntry {
                head: "zfs",
                argv: vec![Literal("destroy"), Hole(Dataset)],
                timeout_class: Fast,
            },
            WhitelistEntry {
                head: "zfs",
                argv: vec![Literal("set"), Hole(PropertyAssignment), Hole(Dataset)],
                timeout_class: Fast,
            },
            WhitelistEntry {
                head: "zfs",
                argv: vec![Literal("get"), Literal("-Hp"), Literal("used"), Hole(Dataset)],
                timeout_class: Fast,
            },
            WhitelistEntry {
                head: "zfs",
                argv: vec![Literal("snapshot"), Hole(Snapshot)],
                timeout_class: Fast,
            },
            WhitelistEntry {
                head: "zfs",
                argv: vec![Literal("send"), Hole(Snapshot)],
                timeout_class: Slow,
            },
            WhitelistEntry {
                head: "smartctl",
                argv: vec![Literal("-a"), Literal("-j"), Hole(DeviceById)],
                timeout_class: Fast,
            },
            WhitelistEntry {
                head: "docker",
                argv: vec![Literal("compose"), Literal("stop"), Hole(PosixName)],
                timeout_class: Fast,
            },
            WhitelistEntry {
                head: "networkctl",
                argv: vec![Literal("reload")],
                timeout_class: Fast,
            },
            WhitelistEntry {
                head: "hdparm",
                argv: vec![Literal("-C"), Hole(DeviceById)],
                timeout_class: Fast,
            },
        ];

        Whitelist { entries }
    }

    /// Every byte the Executor refuses regardless of which hole
    /// matched — defence in depth per spec §4.1.
    pub const FORBIDDEN_BYTES: &'static [u8] = b";&|`$<>\n\r";

    pub fn contains_forbidden_byte(token: &str) -> bool {
        token.bytes().any(|b| Self::FORBIDDEN_BYTES.contains(&b))
    }

    /// Match a concrete invocation against the table. Rejects on
    /// arity mismatch, unknown head, or a literal/hole mismatch at
    /// any position.
    pub fn check(&self, head: &str, argv: &[&str]) -> Result<TimeoutClass, WhitelistError> {
        let mut candidates = self.entries.iter().filter(|e| e.head == head).peekable();
        if candidates.peek().is_none() {
            return Err(WhitelistError::NotWhitelisted(head.to_string()));
        }

        let mut last_arity_err = None;
        for entry in candidates {
            match Self::match_entry(entry, argv) {
                Ok(()) => return Ok(entry.timeout_class),
                Err(WhitelistError::Arity { expected, got }) => {
                    last_arity_err = Some(WhitelistError::Arity { expected, got });
                }
                Err(e @ WhitelistError::InvalidArg { .. }) => {
                    // Keep looking — another pattern for the same head
                    // might match; only surface this if nothing does.
                    last_arity_err.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_arity_err.unwrap_or_else(|| WhitelistError::NotWhitelisted(head.to_string())))
    }

    fn match_entry(entry: &WhitelistEntry, argv: &[&str]) -> Result<(), WhitelistError> {
        let has_variadic = matches!(entry.argv.last(), Some(ArgvPattern::Variadic(_)));
        if !has_variadic && argv.len() != entry.argv.len() {
            return Err(WhitelistError::Arity {
                expected: entry.argv.len(),
                got: argv.len(),
            });
        }
        if has_variadic && argv.len() < entry.argv.len() - 1 {
            return Err(WhitelistError::Arity {
                expected: entry.argv.len() - 1,
                got: argv.len(),
            });
        }

        for (i, pattern) in entry.argv.iter().enumerate() {
            match pattern {
                ArgvPattern::Literal(lit) => {
                    if argv.get(i) != Some(lit) {
                        return Err(WhitelistError::InvalidArg {
                            position: i,
                            reason: "literal mismatch".into(),
                        });
                    }
                }
                ArgvPattern::Hole(hole) => {
                    let value = argv.get(i).ok_or(WhitelistError::Arity {
                        expected: entry.argv.len(),
                        got: argv.len(),
                    })?;
                    hole.validate(value).map_err(|e| WhitelistError::InvalidArg {
                        position: i,
                        reason: e.to_string(),
                    })?;
                }
                ArgvPattern::Variadic(hole) => {
                    if argv[i..].is_empty() {
                        return Err(WhitelistError::Arity {
                            expected: entry.argv.len(),
                            got: argv.len(),
                        });
                    }
                    for (j, value) in argv[i..].iter().enumerate() {
                        hole.validate(value).map_err(|e| WhitelistError::InvalidArg {
                            position: i + j,
                            reason: e.to_string(),
                        })?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for Whitelist {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_name_over_255_chars_is_rejected() {
        let long = "a".repeat(256);
        assert_eq!(Hole::PoolName.validate(&long), Err(HoleError::TooLong));
    }

    #[test]
    fn device_reference_must_be_by_id() {
        assert!(Hole::DeviceById.validate("/dev/disk/by-id/ata-WDC-X").is_ok());
        assert!(Hole::DeviceById.validate("/dev/sdb").is_err());
        assert!(Hole::DeviceById.validate("/dev/disk/by-id/../../etc/passwd").is_err());
    }

    #[test]
    fn scrub_injection_attempt_is_rejected() {
        let wl = Whitelist::standard();
        let err = wl.check("zpool", &["scrub", "tank; rm -rf /"]).unwrap_err();
        assert!(matches!(err, WhitelistError::InvalidArg { position: 1, .. }));
    }

    #[test]
    fn forbidden_bytes_are_caught_even_for_an_otherwise_valid_hole() {
        // A hole can't actually admit these bytes today, but the
        // Executor checks independently regardless (defence in depth).
        assert!(Whitelist::contains_forbidden_byte("tank; rm -rf /"));
        assert!(Whitelist::contains_forbidden_byte("tank$(whoami)"));
        assert!(!Whitelist::contains_forbidden_byte("tank-01"));
    }

    #[test]
    fn unknown_head_is_not_whitelisted() {
        let wl = Whitelist::standard();
        assert_eq!(
            wl.check("rm", &["-rf", "/"]).unwrap_err(),
            WhitelistError::NotWhitelisted("rm".to_string())
        );
    }

    #[test]
    fn property_assignment_rejects_a_bare_value_with_no_equals_sign() {
        assert!(Hole::PropertyAssignment.validate("compression=lz4").is_ok());
        assert!(Hole::PropertyAssignment.validate("lz4").is_err());
        assert!(Hole::PropertyAssignment.validate("compression=lz4;rm -rf /").is_err());
    }

    #[test]
    fn create_mirror_matches_variadic_device_list() {
        let wl = Whitelist::standard();
        let class = wl
            .check(
                "zpool",
                &[
                    "create",
                    "tank",
                    "mirror",
                    "/dev/disk/by-id/ata-WDC-X",
                    "/dev/disk/by-id/ata-WDC-Y",
                ],
            )
            .unwrap();
        assert_eq!(class, TimeoutClass::Slow);
    }
}
