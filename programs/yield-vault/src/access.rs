//! Owner and pause guards, composed at the top of each gated operation.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::accounts::pubkey_str;
use crate::error::{Result, VaultError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownable {
    #[serde(with = "pubkey_str")]
    owner: Pubkey,
}

impl Ownable {
    pub fn new(owner: Pubkey) -> Self {
        Self { owner }
    }

    pub fn owner(&self) -> Pubkey {
        self.owner
    }

    pub fn require_owner(&self, caller: &Pubkey) -> Result<()> {
        if *caller != self.owner {
            tracing::warn!(caller = %caller, owner = %self.owner, "rejected non-owner call");
            return Err(VaultError::Unauthorized);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pausable {
    paused: bool,
}

impl Pausable {
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn require_not_paused(&self) -> Result<()> {
        if self.paused {
            return Err(VaultError::Paused);
        }
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        self.require_not_paused()?;
        self.paused = true;
        Ok(())
    }

    pub fn unpause(&mut self) -> Result<()> {
        if !self.paused {
            return Err(VaultError::InvalidParameter("not paused".into()));
        }
        self.paused = false;
        Ok(())
    }
}
