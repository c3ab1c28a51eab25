pub mod discord;
pub mod telegram;

pub use discord::DiscordRenderer;
pub use telegram::TelegramRenderer;

use relaymon_common::types::ParameterConfig;

/// Top-N shown when a parameter carries no explicit limit.
pub(crate) const DEFAULT_SECTION_LIMIT: usize = 10;

pub(crate) fn limited<'a, T>(items: &'a [T], param: &ParameterConfig) -> &'a [T] {
    let limit = param.limit.unwrap_or(DEFAULT_SECTION_LIMIT);
    &items[..items.len().min(limit)]
}
