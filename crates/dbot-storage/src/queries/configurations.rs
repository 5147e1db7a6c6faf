// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subscription rows.
//!
//! A [`Configuration`] is flattened into one row per entry; the first byte of
//! each entry says what it is (see the schema).

use dbot_core::DbotError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::Configuration;

const IM: &str = "D";
const ALL: &str = "A";
const REGEXP: char = 'R';
const VERBOSE: char = 'V';

/// Flatten a configuration into its row entries.
///
/// Channels, groups, the IM flag, the regexp and the all flag are all kept,
/// plus one `V` entry per verbose channel or group.
pub fn encode(config: &Configuration) -> Vec<String> {
    let mut entries: Vec<String> = config
        .channels
        .iter()
        .chain(config.groups.iter())
        .cloned()
        .collect();
    if config.im {
        entries.push(IM.to_string());
    }
    if !config.regexp.is_empty() {
        entries.push(format!("{REGEXP}{}", config.regexp));
    }
    if config.all {
        entries.push(ALL.to_string());
    }
    entries.extend(
        config
            .verbose_channels
            .iter()
            .chain(config.verbose_groups.iter())
            .map(|id| format!("{VERBOSE}{id}")),
    );
    entries.sort();
    entries.dedup();
    entries
}

/// Rebuild a configuration from its row entries.
pub fn decode(team: &str, entries: &[String]) -> Configuration {
    let mut config = Configuration {
        team: team.to_string(),
        ..Configuration::default()
    };
    for entry in entries {
        match entry.chars().next() {
            Some('C') => config.channels.push(entry.clone()),
            Some('G') => config.groups.push(entry.clone()),
            Some('D') => config.im = true,
            Some('A') => config.all = true,
            Some(REGEXP) => config.regexp = entry[1..].to_string(),
            Some(VERBOSE) => match entry[1..].chars().next() {
                Some('C') => config.verbose_channels.push(entry[1..].to_string()),
                Some('G') => config.verbose_groups.push(entry[1..].to_string()),
                _ => {}
            },
            _ => {}
        }
    }
    config
}

/// The saved configuration of `team`; an inactive default when none is saved.
pub async fn get_configuration(db: &Database, team: &str) -> Result<Configuration, DbotError> {
    let team_owned = team.to_string();
    let entries = db
        .connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare("SELECT channel FROM configurations WHERE team = ?1 ORDER BY channel")?;
            let rows = stmt.query_map(params![team_owned], |row| row.get::<_, String>(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
        .map_err(map_tr_err)?;
    Ok(decode(team, &entries))
}

/// Replace the saved configuration of `config.team` in one transaction.
pub async fn set_configuration(db: &Database, config: &Configuration) -> Result<(), DbotError> {
    let team = config.team.clone();
    let entries = encode(config);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM configurations WHERE team = ?1", params![team])?;
            {
                let mut stmt =
                    tx.prepare("INSERT INTO configurations (team, channel) VALUES (?1, ?2)")?;
                for entry in &entries {
                    stmt.execute(params![team, entry])?;
                }
            }
            tx.commit()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_keeps_every_part() {
        let config = Configuration {
            team: "T1".into(),
            channels: vec!["C1".into(), "C2".into()],
            groups: vec!["G1".into()],
            im: true,
            regexp: "^sec".into(),
            all: true,
            verbose_channels: vec!["C1".into()],
            verbose_groups: vec!["G1".into()],
        };
        let entries = encode(&config);
        assert_eq!(
            entries,
            vec!["A", "C1", "C2", "D", "G1", "R^sec", "VC1", "VG1"]
        );
        assert!(decode("T1", &entries).same_set_as(&config));
    }

    #[test]
    fn regexp_may_start_with_any_letter() {
        let config = Configuration {
            team: "T1".into(),
            regexp: "Corp-.*".into(),
            ..Configuration::default()
        };
        let back = decode("T1", &encode(&config));
        assert_eq!(back.regexp, "Corp-.*");
        assert!(back.channels.is_empty());
    }

    #[test]
    fn empty_configuration_is_inactive() {
        let back = decode("T1", &[]);
        assert!(!back.is_active());
        assert_eq!(back.team, "T1");
    }
}
