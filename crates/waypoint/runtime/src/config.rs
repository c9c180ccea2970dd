//! Runtime configuration for the collaboration core

use serde::{Deserialize, Serialize};

/// Top-level runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollabConfig {
    #[serde(default)]
    pub invitations: InvitationConfig,

    #[serde(default)]
    pub tasks: TaskConfig,

    #[serde(default)]
    pub sweep: SweepConfig,
}

/// Invitation lifecycle limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationConfig {
    /// Lifetime used when the caller does not pick one
    #[serde(default = "default_expiry_days")]
    pub default_expiry_days: u32,

    #[serde(default = "default_max_expiry_days")]
    pub max_expiry_days: u32,

    /// Maximum message length in characters
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,

    /// Random bytes behind an email invitation token (hex encoded, so twice as many chars)
    #[serde(default = "default_token_bytes")]
    pub token_bytes: usize,

    #[serde(default = "default_invitation_page_limit")]
    pub default_page_limit: u32,

    #[serde(default = "default_max_page_limit")]
    pub max_page_limit: u32,
}

impl Default for InvitationConfig {
    fn default() -> Self {
        Self {
            default_expiry_days: 7,
            max_expiry_days: 30,
            max_message_len: 500,
            token_bytes: 32,
            default_page_limit: 20,
            max_page_limit: 100,
        }
    }
}

/// Task field limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(default = "default_max_title_len")]
    pub max_title_len: usize,

    #[serde(default = "default_max_description_len")]
    pub max_description_len: usize,

    #[serde(default = "default_task_page_limit")]
    pub default_page_limit: u32,

    #[serde(default = "default_max_page_limit")]
    pub max_page_limit: u32,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_title_len: 200,
            max_description_len: 2000,
            default_page_limit: 50,
            max_page_limit: 100,
        }
    }
}

/// Periodic expiry sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            enabled: true,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_expiry_days() -> u32 {
    7
}

fn default_max_expiry_days() -> u32 {
    30
}

fn default_max_message_len() -> usize {
    500
}

fn default_token_bytes() -> usize {
    32
}

fn default_invitation_page_limit() -> u32 {
    20
}

fn default_max_page_limit() -> u32 {
    100
}

fn default_max_title_len() -> usize {
    200
}

fn default_max_description_len() -> usize {
    2000
}

fn default_task_page_limit() -> u32 {
    50
}

fn default_sweep_interval() -> u64 {
    300
}
