use serde::{Deserialize, Deserializer, Serialize};
use std::{fmt, str::FromStr};

/// Where a list insertion places the new entry.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListPosition {
    First,
    #[default]
    Last,
}

impl ListPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListPosition::First => "first",
            ListPosition::Last => "last",
        }
    }
}

/// Which instances of a named list an operation applies to when it does not name a parent.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListTarget {
    /// Only the lists hanging off the root record.
    #[default]
    Root,
    /// Every registered list carrying the name.
    All,
}

impl ListTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListTarget::Root => "root",
            ListTarget::All => "all",
        }
    }
}

macro_rules! string_enum {
    ($ty:ident, $what:literal, [$(($name:literal, $value:expr)),+ $(,)?]) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                const VALUES: &[(&str, $ty)] = &[$(($name, $value)),+];

                VALUES
                    .iter()
                    .find(|(string, _)| string.eq_ignore_ascii_case(s))
                    .map(|(_, value)| *value)
                    .ok_or_else(|| {
                        format!(
                            concat!(r#""{}" is not a valid "#, $what, " (expected one of {})."),
                            s,
                            VALUES.iter().map(|(string, _)| *string).collect::<Vec<_>>().join(", ")
                        )
                    })
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                FromStr::from_str(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

string_enum!(
    ListPosition,
    "list position",
    [("first", ListPosition::First), ("last", ListPosition::Last)]
);

string_enum!(
    ListTarget,
    "list target",
    [("root", ListTarget::Root), ("all", ListTarget::All)]
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_from_string_any_case() {
        assert_eq!(ListPosition::from_str("first"), Ok(ListPosition::First));
        assert_eq!(ListPosition::from_str("LaSt"), Ok(ListPosition::Last));
    }

    #[test]
    fn position_from_invalid_string() {
        assert_eq!(
            ListPosition::from_str("middle"),
            Err(r#""middle" is not a valid list position (expected one of first, last)."#.to_owned())
        );
    }

    #[test]
    fn target_round_trips_through_display() {
        for target in [ListTarget::Root, ListTarget::All] {
            assert_eq!(ListTarget::from_str(&target.to_string()), Ok(target));
        }
    }
}
