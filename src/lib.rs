// Copyright 2026 The Thinkgate Project
// SPDX-License-Identifier: Apache-2.0

pub mod config;
pub mod models;
pub mod proxy;
pub mod stream;
pub mod upstream;
