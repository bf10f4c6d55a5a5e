//! The settings plugin
//!
//! Lets a user add or change a payment card, connect a calendar, and save a
//! shipping address. Card and calendar changes happen on the web, so those
//! flows just hand out a link; the address is collected in conversation.

use crate::config::ConfigError;
use crate::flow::FlowRegistry;
use crate::message::{Message, WordType};
use crate::nlp::StructuredInput;
use crate::plugin::Plugin;
use crate::state_machine::select_flow;
use crate::tasks::{self, TaskKind};
use crate::vocab::Vocabulary;

pub const PLUGIN_NAME: &str = "settings";

pub const ADD_CARD: &str = "add_card";
pub const CHANGE_CARD: &str = "change_card";
pub const CHANGE_CALENDAR: &str = "change_calendar";
pub const ADD_ADDRESS: &str = "add_address";

/// Where a confirmed shipping address is kept
pub const SHIPPING_ADDRESS: &str = "shipping_address";

const CHANGE_WORDS: &[&str] = &["change", "modify", "delete", "switch", "alter"];
const CALENDAR_WORDS: &[&str] = &["calendar", "cal", "schedule", "rota"];
const ADDRESS_WORDS: &[&str] = &["address", "addr"];

fn trigger() -> StructuredInput {
    let mut objects = vec!["card"];
    objects.extend_from_slice(ADDRESS_WORDS);
    objects.extend_from_slice(CALENDAR_WORDS);
    StructuredInput::new(
        &["change", "modify", "switch", "alter", "add", "remove", "delete"],
        &objects,
    )
}

fn vocabulary() -> Result<Vocabulary, ConfigError> {
    Vocabulary::builder()
        // "change card" means the change flow, whichever word comes first
        .on(WordType::Object, &["card"], |msg: &Message, memory, _| {
            if !msg.has_word(WordType::Command, CHANGE_WORDS) {
                select_flow(memory, ADD_CARD);
            }
            Ok(String::new())
        })
        .select(WordType::Command, CHANGE_WORDS, CHANGE_CARD)
        .select(WordType::Object, CALENDAR_WORDS, CHANGE_CALENDAR)
        .select(WordType::Object, ADDRESS_WORDS, ADD_ADDRESS)
        .build()
}

fn flows(base_url: &str) -> Result<FlowRegistry, ConfigError> {
    let base_url = base_url.trim_end_matches('/');
    let profile = format!("{base_url}/profile");

    FlowRegistry::new()
        .with(tasks::flow(
            ADD_CARD,
            &TaskKind::Link {
                prompt: "You can add your card securely here:".to_string(),
                url: format!("{base_url}/cards/new"),
            },
        )?)?
        .with(tasks::flow(
            CHANGE_CARD,
            &TaskKind::Link {
                prompt: "You can change your cards securely here:".to_string(),
                url: profile.clone(),
            },
        )?)?
        .with(tasks::flow(
            CHANGE_CALENDAR,
            &TaskKind::Link {
                prompt: "You can connect your Google calendar on your profile:".to_string(),
                url: profile,
            },
        )?)?
        .with(tasks::flow(
            ADD_ADDRESS,
            &TaskKind::RequestAddress {
                label: SHIPPING_ADDRESS.to_string(),
            },
        )?)
}

/// Build the settings plugin; links point under `base_url`
pub fn plugin(base_url: &str) -> Result<Plugin, ConfigError> {
    Plugin::new(PLUGIN_NAME, trigger(), vocabulary()?, flows(base_url)?)
}
