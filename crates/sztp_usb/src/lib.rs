// SPDX-License-Identifier: Apache-2.0

//! Secure ZTP (RFC 8572) bootstrapping data for removable media: builds
//! and signs the conveyed information and owner-certificate packages,
//! then lays the artifacts out where a device expects to find them on a
//! USB stick.

pub mod assemble;
pub mod cms;
pub mod digest;
pub mod error;
pub mod inputs;
pub mod models;
pub mod output;
pub mod validate;
