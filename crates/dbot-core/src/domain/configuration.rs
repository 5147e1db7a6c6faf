// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel subscription for one workspace.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Which channels the bot acts in for a workspace.
///
/// Channel ids carry their kind in the first byte: `C` public channel,
/// `G` private group, `D` direct message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    /// Internal team id.
    #[serde(default)]
    pub team: String,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub im: bool,
    /// Channel-name pattern. Empty means unset.
    #[serde(default)]
    pub regexp: String,
    #[serde(default)]
    pub all: bool,
    #[serde(default)]
    pub verbose_channels: Vec<String>,
    #[serde(default)]
    pub verbose_groups: Vec<String>,
}

impl Configuration {
    /// A configuration that monitors every channel the bot is in.
    pub fn all_channels(team: impl Into<String>) -> Self {
        Self {
            team: team.into(),
            all: true,
            im: true,
            ..Self::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.all || !self.channels.is_empty() || !self.groups.is_empty() || self.im
    }

    /// Whether a message in channel `id` (named `name`) should be processed.
    pub fn is_interested_in(&self, id: &str, name: &str) -> bool {
        if self.all {
            return true;
        }
        let listed = match id.as_bytes().first() {
            Some(b'C') => self.channels.iter().any(|c| c == id),
            Some(b'G') => self.groups.iter().any(|g| g == id),
            Some(b'D') => self.im,
            _ => false,
        };
        listed || self.regexp_matches(name)
    }

    /// Whether replies in channel `id` include per-oracle details.
    pub fn is_verbose(&self, id: &str) -> bool {
        match id.as_bytes().first() {
            Some(b'C') => self.verbose_channels.iter().any(|c| c == id),
            Some(b'G') => self.verbose_groups.iter().any(|g| g == id),
            Some(b'D') => true,
            _ => false,
        }
    }

    fn regexp_matches(&self, name: &str) -> bool {
        if self.regexp.is_empty() {
            return false;
        }
        Regex::new(&self.regexp)
            .map(|re| re.is_match(name))
            .unwrap_or(false)
    }

    /// Equality ignoring list order and duplicates.
    pub fn same_set_as(&self, other: &Configuration) -> bool {
        fn set(v: &[String]) -> std::collections::BTreeSet<&str> {
            v.iter().map(String::as_str).collect()
        }
        self.team == other.team
            && self.im == other.im
            && self.all == other.all
            && self.regexp == other.regexp
            && set(&self.channels) == set(&other.channels)
            && set(&self.groups) == set(&other.groups)
            && set(&self.verbose_channels) == set(&other.verbose_channels)
            && set(&self.verbose_groups) == set(&other.verbose_groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config() -> Configuration {
        Configuration {
            team: "T1".into(),
            channels: vec!["C1".into()],
            groups: vec!["G1".into()],
            regexp: "^sec-".into(),
            ..Configuration::default()
        }
    }

    #[test]
    fn listed_channel_and_group_are_interesting() {
        let c = config();
        assert!(c.is_interested_in("C1", "general"));
        assert!(c.is_interested_in("G1", "private"));
        assert!(!c.is_interested_in("C2", "random"));
        assert!(!c.is_interested_in("G2", "other"));
    }

    #[test]
    fn channel_id_in_wrong_list_is_not_interesting() {
        let mut c = config();
        c.groups.push("C9".into());
        assert!(!c.is_interested_in("C9", "x"));
    }

    #[test]
    fn direct_messages_follow_im_flag() {
        let mut c = config();
        assert!(!c.is_interested_in("D1", ""));
        c.im = true;
        assert!(c.is_interested_in("D1", ""));
    }

    #[test]
    fn regexp_matches_channel_name() {
        let c = config();
        assert!(c.is_interested_in("C7", "sec-alerts"));
        assert!(!c.is_interested_in("C7", "alerts"));
    }

    #[test]
    fn invalid_or_empty_regexp_never_matches() {
        let mut c = Configuration::default();
        assert!(!c.is_interested_in("C1", "anything"));
        c.regexp = "([".into();
        assert!(!c.is_interested_in("C1", "(["));
    }

    #[test]
    fn all_flag_wins() {
        let c = Configuration::all_channels("T1");
        assert!(c.is_interested_in("C42", "whatever"));
        assert!(c.is_active());
    }

    #[test]
    fn activity_ignores_regexp() {
        let c = Configuration {
            regexp: ".*".into(),
            ..Configuration::default()
        };
        assert!(!c.is_active());
    }

    #[test]
    fn verbose_lists_and_dms() {
        let c = Configuration {
            verbose_channels: vec!["C1".into()],
            verbose_groups: vec!["G1".into()],
            ..Configuration::default()
        };
        assert!(c.is_verbose("C1"));
        assert!(c.is_verbose("G1"));
        assert!(c.is_verbose("D5"));
        assert!(!c.is_verbose("C2"));
    }

    #[test]
    fn set_equality_ignores_order() {
        let a = Configuration {
            channels: vec!["C1".into(), "C2".into()],
            ..Configuration::default()
        };
        let b = Configuration {
            channels: vec!["C2".into(), "C1".into()],
            ..Configuration::default()
        };
        assert!(a.same_set_as(&b));
    }

    proptest! {
        #[test]
        fn interest_matches_definition(
            all in any::<bool>(),
            im in any::<bool>(),
            channels in proptest::collection::vec("C[0-9]{1,2}", 0..4),
            groups in proptest::collection::vec("G[0-9]{1,2}", 0..4),
            id in "[CGD][0-9]{1,2}",
        ) {
            let c = Configuration { all, im, channels: channels.clone(), groups: groups.clone(), ..Configuration::default() };
            let expected = all
                || (id.starts_with('C') && channels.contains(&id))
                || (id.starts_with('G') && groups.contains(&id))
                || (id.starts_with('D') && im);
            prop_assert_eq!(c.is_interested_in(&id, "name"), expected);
        }
    }
}
