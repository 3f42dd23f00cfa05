//! Provider adapters. Implement the WhatsApp/Telegram validation ports.
//!
//! Variant selection happens once in the wiring (`main.rs`); nothing here
//! dispatches on strings at call time.

pub mod account_pool;
pub mod tg_heuristic;
pub mod tg_mtp;
pub mod tg_session;
pub mod wa_deeplink;
pub mod wa_lookup;
pub mod wa_web;

pub use account_pool::{AccountPool, AccountSeed, ClaimedAccount};
pub use tg_heuristic::StatisticalTelegram;
pub use tg_mtp::MtpTelegram;
pub use wa_deeplink::DeeplinkWhatsApp;
pub use wa_lookup::{Dialog360Lookup, TwilioLookup, VonageLookup};
pub use wa_web::WebHeuristicWhatsApp;
