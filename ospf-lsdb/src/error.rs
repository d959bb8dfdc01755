//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use tracing::warn;

use crate::packet::lsa::{LsaKey, LsaType};

// OSPF LSDB errors.
#[derive(Debug)]
pub enum Error {
    // Configuration
    ConfigLoad(String, std::io::Error),
    ConfigParse(toml::de::Error),
    // Collaborator lookups
    AreaIdNotFound(Ipv4Addr),
    AreaIdExists(Ipv4Addr),
    InterfaceNotFound(u32),
    // LSDB integrity
    LsaChecksumMismatch(LsaType, LsaKey),
}

// ===== impl Error =====

impl Error {
    pub fn log(&self) {
        match self {
            Error::ConfigLoad(path, error) => {
                warn!(%path, error = %with_source(error), "{}", self);
            }
            Error::ConfigParse(error) => {
                warn!(%error, "{}", self);
            }
            Error::AreaIdNotFound(area_id) | Error::AreaIdExists(area_id) => {
                warn!(%area_id, "{}", self);
            }
            Error::InterfaceNotFound(ifindex) => {
                warn!(%ifindex, "{}", self);
            }
            Error::LsaChecksumMismatch(lsa_type, key) => {
                warn!(
                    %lsa_type,
                    lsa_id = %key.lsa_id,
                    adv_rtr = %key.adv_rtr,
                    "{}", self
                );
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::ConfigLoad(..) => {
                write!(f, "failed to load configuration file")
            }
            Error::ConfigParse(..) => {
                write!(f, "failed to parse configuration file")
            }
            Error::AreaIdNotFound(..) => {
                write!(f, "area ID not found")
            }
            Error::AreaIdExists(..) => {
                write!(f, "area ID already exists")
            }
            Error::InterfaceNotFound(..) => {
                write!(f, "interface not found")
            }
            Error::LsaChecksumMismatch(..) => {
                write!(f, "invalid LSA checksum (memory error detected)")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::ConfigLoad(_, error) => Some(error),
            Error::ConfigParse(error) => Some(error),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Error {
        Error::ConfigParse(error)
    }
}

// ===== global functions =====

fn with_source<E: std::error::Error>(error: E) -> String {
    if let Some(source) = error.source() {
        format!("{} ({})", error, with_source(source))
    } else {
        error.to_string()
    }
}
