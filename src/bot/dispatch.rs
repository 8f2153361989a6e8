//! Routing of inbound messages to handlers

use crate::telegram::{Message, PhotoSize};
use regex::Regex;
use std::sync::LazyLock;

static URL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"https?://\S+").ok());

/// What an inbound message asks the bot to do
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// `/start` or `/help`
    Welcome,
    /// `ip`: report the egress address seen through the proxy
    ProbeIp,
    /// `photo <url>`: fetch and send an image gallery
    Gallery(String),
    /// Any text containing a link: fetch and send a video
    Video(String),
    /// A photo the user sent, to be echoed back
    EchoPhoto(PhotoSize),
    /// Nothing to do
    Ignore,
}

/// Classify a message
pub fn route(message: &Message) -> Command {
    if let Some(text) = message.text.as_deref() {
        return route_text(text);
    }
    match message.largest_photo() {
        Some(photo) => Command::EchoPhoto(photo.clone()),
        None => Command::Ignore,
    }
}

/// Classify message text
pub fn route_text(text: &str) -> Command {
    // Only the bare word, as typed
    if text == "ip" {
        return Command::ProbeIp;
    }

    let text = text.trim();

    if let Some(command) = text.strip_prefix('/') {
        // `/start@my_bot` addresses a specific bot in group chats
        let name = command
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .split('@')
            .next()
            .unwrap_or_default();
        return match name {
            "start" | "help" => Command::Welcome,
            _ => Command::Ignore,
        };
    }

    if let Some((head, rest)) = text.split_once(char::is_whitespace)
        && head.eq_ignore_ascii_case("photo")
    {
        let rest = rest.trim();
        if rest.is_empty() {
            return Command::Ignore;
        }
        return Command::Gallery(extract_url(rest).unwrap_or(rest).to_string());
    }

    if text.contains("http") {
        return Command::Video(extract_url(text).unwrap_or(text).to_string());
    }

    Command::Ignore
}

/// First `http(s)://` link in `text`
pub fn extract_url(text: &str) -> Option<&str> {
    URL_PATTERN.as_ref()?.find(text).map(|m| m.as_str())
}
