// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

#[allow(unused_extern_crates)]
extern crate self as kres_controller;

pub mod adapter;
pub mod condition;
pub mod controller;
pub mod document;
pub mod error;
pub mod identity;
pub mod kind;
pub mod poll;
pub mod store;
