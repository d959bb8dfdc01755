//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::Deserialize;

use crate::error::Error;

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouterCfg {
    // Use the RFC 1583 rules when selecting among multiple paths to the same
    // AS boundary router.
    pub rfc1583_compatibility: bool,
    // Maximum number of equal-cost next hops kept per destination.
    pub max_paths: u16,
    // Maximum number of entries kept in the LSA log.
    pub lsa_log_max_size: usize,
}

// ===== impl RouterCfg =====

impl RouterCfg {
    // Parses configuration from a TOML string.
    pub fn from_toml(config_str: &str) -> Result<RouterCfg, Error> {
        let config = toml::from_str(config_str)?;
        Ok(config)
    }

    // Loads configuration from a TOML file.
    pub fn load(path: &str) -> Result<RouterCfg, Error> {
        let config_str = std::fs::read_to_string(path)
            .map_err(|error| Error::ConfigLoad(path.to_owned(), error))?;
        RouterCfg::from_toml(&config_str)
    }
}

impl Default for RouterCfg {
    fn default() -> RouterCfg {
        RouterCfg {
            rfc1583_compatibility: false,
            max_paths: 16,
            lsa_log_max_size: 64,
        }
    }
}
