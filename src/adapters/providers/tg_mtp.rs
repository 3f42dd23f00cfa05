//! MTP-backed Telegram provider using a grammers session.
//!
//! Resolves numbers with raw `contacts.ResolvePhone`. Telegram privacy rules
//! make `PHONE_NOT_OCCUPIED` ambiguous — the number may have no account, or
//! the account hides itself from phone discovery — so that case is reported
//! as `status: unknown` with `exists: unknown`, never coerced to a binary
//! answer. Handles FloodWait by sleeping and retrying.

use crate::domain::{Platform, ValidationResult, ValidationStatus};
use crate::ports::{CapabilityMode, TelegramProvider};
use grammers_client::tl;
use grammers_client::Client;
use grammers_client::InvocationError;
use std::time::Duration;
use tracing::{debug, warn};

/// FloodWaits longer than this fail the record instead of stalling the
/// whole batch behind one number.
const MAX_FLOOD_WAIT_SECS: u64 = 30;

pub struct MtpTelegram {
    client: Client,
    /// Also fetch full-user metadata (about, photo flag) for resolved
    /// numbers (the `mtp_profile` method).
    fetch_profile: bool,
}

impl MtpTelegram {
    pub fn new(client: Client, fetch_profile: bool) -> Self {
        Self {
            client,
            fetch_profile,
        }
    }

    fn unknown_result() -> ValidationResult {
        let mut details = serde_json::Map::new();
        details.insert("method".to_string(), "mtp".into());
        details.insert("exists".to_string(), "unknown".into());
        details.insert(
            "reason".to_string(),
            "PHONE_NOT_OCCUPIED: unregistered and privacy-hidden numbers are indistinguishable"
                .into(),
        );
        ValidationResult::new(Platform::Telegram, ValidationStatus::Unknown)
            .with_details(details)
    }

    fn active_result(user: &tl::types::User, profile: Option<ProfileInfo>) -> ValidationResult {
        let mut details = serde_json::Map::new();
        details.insert("method".to_string(), "mtp".into());
        details.insert("user_id".to_string(), user.id.into());
        if let Some(username) = &user.username {
            details.insert("username".to_string(), username.clone().into());
        }
        details.insert("premium".to_string(), user.premium.into());
        if let Some(profile) = profile {
            if let Some(about) = profile.about {
                details.insert("about".to_string(), about.into());
            }
            details.insert("has_photo".to_string(), profile.has_photo.into());
        }
        ValidationResult::new(Platform::Telegram, ValidationStatus::Active).with_details(details)
    }

    /// Best-effort full-user fetch; failures only cost the extra metadata.
    async fn fetch_profile_info(&self, user: &tl::types::User) -> Option<ProfileInfo> {
        let access_hash = user.access_hash?;
        let req = tl::functions::users::GetFullUser {
            id: tl::enums::InputUser::User(tl::types::InputUser {
                user_id: user.id,
                access_hash,
            }),
        };
        match self.client.invoke(&req).await {
            Ok(tl::enums::users::UserFull::Full(full)) => {
                let tl::enums::UserFull::Full(full_user) = full.full_user;
                Some(ProfileInfo {
                    about: full_user.about,
                    has_photo: full_user.profile_photo.is_some(),
                })
            }
            Err(e) => {
                debug!(user_id = user.id, error = %e, "GetFullUser failed, skipping profile");
                None
            }
        }
    }
}

struct ProfileInfo {
    about: Option<String>,
    has_photo: bool,
}

#[async_trait::async_trait]
impl TelegramProvider for MtpTelegram {
    async fn validate(&self, phone: &str) -> ValidationResult {
        let req = tl::functions::contacts::ResolvePhone {
            phone: phone.trim_start_matches('+').to_string(),
        };

        for attempt in 0..3 {
            match self.client.invoke(&req).await {
                Ok(tl::enums::contacts::ResolvedPeer::Peer(resolved)) => {
                    let user = resolved.users.iter().find_map(|u| match u {
                        tl::enums::User::User(user) => Some(user),
                        tl::enums::User::Empty(_) => None,
                    });
                    return match user {
                        Some(user) => {
                            let profile = if self.fetch_profile {
                                self.fetch_profile_info(user).await
                            } else {
                                None
                            };
                            Self::active_result(user, profile)
                        }
                        // resolved to a non-user peer: nothing to report
                        None => Self::unknown_result(),
                    };
                }
                Err(InvocationError::Rpc(rpc)) if rpc.code == 420 => {
                    let wait_secs = rpc.value.unwrap_or(60) as u64;
                    if wait_secs > MAX_FLOOD_WAIT_SECS {
                        return ValidationResult::error(
                            Platform::Telegram,
                            format!("FloodWait {wait_secs}s exceeds per-record limit"),
                        );
                    }
                    warn!(attempt, wait_secs, "FloodWait, sleeping");
                    tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                }
                Err(InvocationError::Rpc(rpc)) if rpc.name == "PHONE_NOT_OCCUPIED" => {
                    return Self::unknown_result();
                }
                Err(e) => return ValidationResult::error(Platform::Telegram, e.to_string()),
            }
        }

        ValidationResult::error(Platform::Telegram, "FloodWait max retries")
    }

    fn mode(&self) -> CapabilityMode {
        CapabilityMode::Live
    }
}
