//! Typed node options and option-set resolution.

use chrono::{Local, NaiveDate, NaiveDateTime};
use indexmap::IndexMap;

use crate::domain::error::{StructuralRule, TreeError, TreeResult};

/// Format used when a timestamp option is displayed or exported.
pub const TIME_FORMAT: &str = "%B %d, %Y %I:%M:%S %p";

const TIME_INPUT_FORMATS: &[&str] = &[
    TIME_FORMAT,
    "%B %d, %Y %I:%M %p",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
];

const DATE_INPUT_FORMATS: &[&str] = &["%B %d, %Y", "%Y-%m-%d"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Flag,
    Text(String),
    Time(NaiveDateTime),
}

impl OptionValue {
    /// Value as it is exported; flags have no value.
    pub fn display(&self) -> Option<String> {
        match self {
            OptionValue::Flag => None,
            OptionValue::Text(text) => Some(text.clone()),
            OptionValue::Time(time) => Some(time.format(TIME_FORMAT).to_string()),
        }
    }

    pub fn as_time(&self) -> Option<NaiveDateTime> {
        match self {
            OptionValue::Time(time) => Some(*time),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Flag,
    Text,
    Time,
    /// Not stored on the node: setting it activates the node.
    Active,
}

impl OptionKind {
    /// Parses a raw option value. `Active` yields `None`.
    pub fn parse(self, name: &str, raw: Option<&str>) -> TreeResult<Option<OptionValue>> {
        let raw = raw.map(str::trim).filter(|s| !s.is_empty());
        match self {
            OptionKind::Active => Ok(None),
            OptionKind::Flag => Ok(Some(OptionValue::Flag)),
            OptionKind::Text => Ok(Some(OptionValue::Text(
                raw.unwrap_or_default().to_string(),
            ))),
            OptionKind::Time => match raw {
                None => Ok(Some(OptionValue::Time(now()))),
                Some(raw) => parse_time(raw).map(|t| Some(OptionValue::Time(t))).ok_or_else(|| {
                    TreeError::structural(
                        format!("option {name}"),
                        StructuralRule::InvalidOptionValue {
                            name: name.to_string(),
                            value: raw.to_string(),
                        },
                    )
                }),
            },
        }
    }
}

pub fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

pub fn parse_time(raw: &str) -> Option<NaiveDateTime> {
    TIME_INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| parse_date(raw).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    DATE_INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw.trim(), fmt).ok())
}

#[derive(Debug)]
pub struct OptionSpec {
    pub name: &'static str,
    pub kind: OptionKind,
}

/// Named group of options a node type accepts.
#[derive(Debug)]
pub struct OptionSet {
    pub name: &'static str,
    pub specs: &'static [OptionSpec],
}

pub type ResolvedOptions = IndexMap<&'static str, OptionKind>;

/// Resolves option sets listed base first, derived last.
///
/// A set that appears more than once (same object) is only applied once;
/// a later set redefining a name wins but keeps the original position.
pub fn resolve_option_sets(sets: &[&'static OptionSet]) -> ResolvedOptions {
    let mut seen: Vec<&'static OptionSet> = Vec::new();
    let mut resolved = ResolvedOptions::new();
    for set in sets {
        if seen.iter().any(|s| std::ptr::eq(*s, *set)) {
            continue;
        }
        seen.push(set);
        for spec in set.specs {
            resolved.insert(spec.name, spec.kind);
        }
    }
    resolved
}

pub static ACTIVE_OPTIONS: OptionSet = OptionSet {
    name: "active",
    specs: &[OptionSpec {
        name: "active",
        kind: OptionKind::Active,
    }],
};

pub static TASK_OPTIONS: OptionSet = OptionSet {
    name: "task",
    specs: &[
        OptionSpec {
            name: "started",
            kind: OptionKind::Time,
        },
        OptionSpec {
            name: "finished",
            kind: OptionKind::Time,
        },
    ],
};

pub static COMMENT_OPTIONS: OptionSet = OptionSet {
    name: "comment",
    specs: &[OptionSpec {
        name: "time",
        kind: OptionKind::Time,
    }],
};

#[cfg(test)]
mod tests {
    use super::*;

    static OVERRIDE: OptionSet = OptionSet {
        name: "override",
        specs: &[OptionSpec {
            name: "started",
            kind: OptionKind::Text,
        }],
    };

    #[test]
    fn given_repeated_set_when_resolving_then_applies_once() {
        let resolved = resolve_option_sets(&[&TASK_OPTIONS, &ACTIVE_OPTIONS, &TASK_OPTIONS]);
        let names: Vec<_> = resolved.keys().copied().collect();
        assert_eq!(names, vec!["started", "finished", "active"]);
    }

    #[test]
    fn given_derived_set_when_resolving_then_most_derived_wins() {
        let resolved = resolve_option_sets(&[&TASK_OPTIONS, &OVERRIDE]);
        assert_eq!(resolved.get("started"), Some(&OptionKind::Text));
        assert_eq!(resolved.get_index_of("started"), Some(0));
    }

    #[test]
    fn given_human_and_iso_timestamps_when_parsing_then_both_accepted() {
        let a = parse_time("June 1, 2013 1:00 AM").unwrap();
        let b = parse_time("2013-06-01 01:00").unwrap();
        assert_eq!(a, b);
        assert!(parse_time("2013-06-01").is_some());
        assert!(parse_time("yesterday-ish").is_none());
    }

    #[test]
    fn given_time_value_when_displayed_then_parses_back() {
        let value = OptionKind::Time
            .parse("started", Some("2020-02-03 04:05:06"))
            .unwrap()
            .unwrap();
        let shown = value.display().unwrap();
        assert_eq!(parse_time(&shown), value.as_time());
    }
}
