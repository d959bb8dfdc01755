//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod area;
pub mod collections;
pub mod config;
pub mod debug;
pub mod error;
pub mod flood;
pub mod lsdb;
pub mod packet;
pub mod route;
pub mod router;
pub mod southbound;

pub use crate::router::Router;
