// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Direct-message commands: `join`, `verbose`, `config`, `vt`, `xfe`, `help`.

use dbot_core::chat::{Conversation, PostMessage};
use dbot_core::DbotError;
use tracing::{info, warn};

use crate::Bot;
use crate::subscription::Subscription;

pub const HELP_TEXT: &str = "Here are the commands I understand when you send me a DIRECT MESSAGE here:
*config*: list the current channels I'm listening on
*join all/#channel1,#channel2...*: I will join all/specified public channels and start monitoring them.
*verbose on/off #channel1,#channel2,private1...* - turn on verbose mode on the specified channels or private groups
verbose mode is usually used by security professionals. When in verbose mode, dbot will display reputation details about any URL, IP or file including clean ones.

*vt the-api-key-you-got-from-vt*: add your own VirusTotal key to use. Accepts \"-\" to return to default. You can get a key at https://www.virustotal.com/en/documentation/public-api/
*xfe the-api-key-you-got-from-xfe the-password-you-got*: add your own IBM X-Force Exchange credentials to use. Accepts \"-\" to return to default. You can get credentials at https://exchange.xforce.ibmcloud.com/
- It's important to specify your own keys to get reliable results as our public API keys are rate limited.";

const NOT_UNDERSTOOD: &str = "Sorry, I could not understand you.";
const VERBOSE_USAGE: &str = "I could not understand your command. Verbose command is:
verbose on #channel1,#channel2 - to turn on verbose mode on for a list of channels.
verbose off #channel1,#channel2 - to turn off verbose mode on for a list of channels.";

/// A recognised direct-message command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Join,
    Verbose,
    Config,
    Vt,
    Xfe,
    Help,
}

impl Command {
    /// Recognise the command word at the start of `text`.
    pub fn parse(text: &str) -> Option<Command> {
        let word = text.split_whitespace().next()?.to_lowercase();
        match word.as_str() {
            "join" => Some(Command::Join),
            "verbose" => Some(Command::Verbose),
            "config" => Some(Command::Config),
            "vt" => Some(Command::Vt),
            "xfe" => Some(Command::Xfe),
            "?" | "help" => Some(Command::Help),
            _ => None,
        }
    }
}

/// Channel ids named from word `from` on: `<#C1|name>`, `#name` or `name`.
pub(crate) fn parse_channels(
    text: &str,
    from: usize,
    conversations: &[Conversation],
) -> Result<Vec<String>, DbotError> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= from {
        return Err(DbotError::Internal(format!("not enough parameters in '{text}'")));
    }
    let mut ids = Vec::new();
    for token in words[from..].iter().flat_map(|w| w.split(',')) {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let id = if let Some(inner) = token.strip_prefix("<#").and_then(|t| t.strip_suffix('>')) {
            Some(inner.split('|').next().unwrap_or(inner).to_string())
        } else {
            let name = token.strip_prefix('#').unwrap_or(token);
            conversations
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(name))
                .map(|c| c.id.clone())
        };
        if let Some(id) = id.filter(|id| !id.is_empty() && !ids.contains(id)) {
            ids.push(id);
        }
    }
    Ok(ids)
}

impl Bot {
    /// Run `command` from a direct message and answer in `channel`.
    pub(crate) async fn run_command(
        &self,
        command: Command,
        sub: &Subscription,
        channel: &str,
        text: &str,
    ) {
        info!(team = %sub.team.external_id, command = ?command, "running command");
        let answer = match command {
            Command::Join => self.join(sub, text).await,
            Command::Verbose => self.verbose(sub, text).await,
            Command::Config => self.show_config(sub).await,
            Command::Vt => self.set_vt_key(sub, text).await,
            Command::Xfe => self.set_xfe_key(sub, text).await,
            Command::Help => HELP_TEXT.to_string(),
        };
        if let Err(e) = sub.client.post_message(&PostMessage::text(channel, answer)).await {
            warn!(team = %sub.team.external_id, error = %e, "unable to answer command");
        }
    }

    async fn join(&self, sub: &Subscription, text: &str) -> String {
        let Some(target) = text.split_whitespace().nth(1) else {
            return NOT_UNDERSTOOD.into();
        };
        let conversations = match sub.client.list_conversations("public_channel").await {
            Ok(c) => c,
            Err(e) => {
                warn!(team = %sub.team.external_id, error = %e, "unable to list channels");
                return "Error retrieving current configuration. Rest assured we are looking into the issue.".into();
            }
        };
        let requested = if target.eq_ignore_ascii_case("all") {
            None
        } else {
            match parse_channels(text, 1, &conversations) {
                Ok(ids) => Some(ids),
                Err(_) => return NOT_UNDERSTOOD.into(),
            }
        };
        let candidates: Vec<&Conversation> = conversations
            .iter()
            .filter(|c| !c.is_member)
            .filter(|c| requested.as_ref().is_none_or(|ids| ids.contains(&c.id)))
            .collect();
        if candidates.is_empty() {
            return "I was already monitoring all public channels but thanks for thinking of me."
                .into();
        }

        // The bot cannot invite itself; a workspace member has to.
        let inviter = match self.repo.team_members(&sub.team.id).await {
            Ok(members) => members.into_iter().find(|u| u.can_post()),
            Err(e) => {
                warn!(team = %sub.team.external_id, error = %e, "unable to load team members");
                None
            }
        };
        let mut joined = Vec::new();
        if let Some(inviter) = inviter {
            let client = self.connector.client(&inviter.token);
            for channel in candidates {
                match client
                    .conversations_invite(&channel.id, &sub.team.bot_user_id)
                    .await
                {
                    Ok(()) => joined.push(channel.name.clone()),
                    Err(e) => info!(channel = %channel.id, error = %e, "invite failed"),
                }
            }
        }
        if joined.is_empty() {
            "I could not invite myself to the public channels, rest assured we are looking into the issue.".into()
        } else {
            format!(
                "I've started monitoring the following channels: {}",
                joined.join(", ")
            )
        }
    }

    async fn verbose(&self, sub: &Subscription, text: &str) -> String {
        let words: Vec<String> = text.split_whitespace().map(str::to_lowercase).collect();
        let on = match words.get(1).map(String::as_str) {
            Some("on") => true,
            Some("off") => false,
            _ => return VERBOSE_USAGE.into(),
        };
        let conversations = sub
            .client
            .list_conversations("public_channel,private_channel")
            .await
            .unwrap_or_default();
        let Ok(ids) = parse_channels(text, 2, &conversations) else {
            return VERBOSE_USAGE.into();
        };

        let mut conf = sub.configuration.clone();
        let mut changed = false;
        for id in ids {
            let list = match id.as_bytes().first() {
                Some(b'C') => &mut conf.verbose_channels,
                Some(b'G') => &mut conf.verbose_groups,
                _ => continue,
            };
            let present = list.contains(&id);
            if on && !present {
                list.push(id);
                changed = true;
            } else if !on && present {
                list.retain(|c| *c != id);
                changed = true;
            }
        }
        if !changed {
            return "Verbose state did not change - could not find anything new to change".into();
        }
        conf.team = sub.team.id.clone();
        if let Err(e) = self.repo.set_channels_and_groups(&conf).await {
            warn!(team = %sub.team.external_id, error = %e, "unable to store verbose state");
            return "I had an issue saving the verbose state.".into();
        }
        self.subscriptions.update_configuration(conf.clone()).await;
        if let Err(e) = self.queue.push_conf(&conf).await {
            warn!(team = %sub.team.external_id, error = %e, "unable to broadcast configuration");
        }
        "Verbose state was changed.".into()
    }

    async fn show_config(&self, sub: &Subscription) -> String {
        let conversations = match sub
            .client
            .list_conversations("public_channel,private_channel")
            .await
        {
            Ok(c) => c,
            Err(e) => {
                warn!(team = %sub.team.external_id, error = %e, "unable to list channels");
                return "Error retrieving configuration. Rest assured we are looking into the issue."
                    .into();
            }
        };
        let (mut channels, mut verbose_channels, mut groups, mut verbose_groups) =
            (Vec::new(), Vec::new(), Vec::new(), Vec::new());
        for c in conversations.iter().filter(|c| c.is_member) {
            let verbose = sub.configuration.is_verbose(&c.id);
            let bucket = match (c.is_channel && !c.is_private, verbose) {
                (true, false) => &mut channels,
                (true, true) => &mut verbose_channels,
                (false, false) => &mut groups,
                (false, true) => &mut verbose_groups,
            };
            bucket.push(c.name.as_str());
        }
        let mut text = format!("Channels I'm monitoring: {}", channels.join(", "));
        if !verbose_channels.is_empty() {
            text.push_str(&format!(
                "\nChannels I'm monitoring and providing extra info: {}",
                verbose_channels.join(", ")
            ));
        }
        if !groups.is_empty() {
            text.push_str(&format!(
                "\nPrivate channels I'm monitoring: {}",
                groups.join(", ")
            ));
        }
        if !verbose_groups.is_empty() {
            text.push_str(&format!(
                "\nPrivate channels I'm monitoring and providing extra info: {}",
                verbose_groups.join(", ")
            ));
        }
        if !sub.team.vt_key.is_empty() {
            text.push_str(&format!(
                "\nUsing your own VirusTotal key ending with {}",
                dbot_vault::last_four(&sub.team.vt_key)
            ));
        }
        if !sub.team.xfe_key.is_empty() {
            text.push_str(&format!(
                "\nUsing your own IBM X-Force Exchange key ending with {}",
                dbot_vault::last_four(&sub.team.xfe_key)
            ));
        }
        text
    }

    async fn set_vt_key(&self, sub: &Subscription, text: &str) -> String {
        let words: Vec<&str> = text.split_whitespace().collect();
        let [_, key] = words.as_slice() else {
            return NOT_UNDERSTOOD.into();
        };
        let mut team = sub.team.clone();
        let clearing = *key == "-";
        team.vt_key = if clearing { String::new() } else { key.to_string() };
        match self.repo.set_team(&team).await {
            Ok(()) => {
                self.subscriptions.update_team(team).await;
                if clearing {
                    "Cleared VT key - using default".into()
                } else {
                    "VT key set.".into()
                }
            }
            Err(e) => {
                warn!(team = %sub.team.external_id, error = %e, "unable to store VT key");
                "Error setting VT key - no worries, we are handling it".into()
            }
        }
    }

    async fn set_xfe_key(&self, sub: &Subscription, text: &str) -> String {
        let words: Vec<&str> = text.split_whitespace().collect();
        let mut team = sub.team.clone();
        let clearing = match words.as_slice() {
            [_, "-"] | [_, "-", _] => {
                team.xfe_key.clear();
                team.xfe_pass.clear();
                true
            }
            [_, key, pass] => {
                team.xfe_key = key.to_string();
                team.xfe_pass = pass.to_string();
                false
            }
            _ => return NOT_UNDERSTOOD.into(),
        };
        match self.repo.set_team(&team).await {
            Ok(()) => {
                self.subscriptions.update_team(team).await;
                if clearing {
                    "Cleared XFE key - using default".into()
                } else {
                    "XFE key set.".into()
                }
            }
            Err(e) => {
                warn!(team = %sub.team.external_id, error = %e, "unable to store XFE key");
                "Error setting XFE key - no worries, we are handling it".into()
            }
        }
    }
}
