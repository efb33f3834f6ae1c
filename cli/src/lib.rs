//! imgbatch-cli library - exposes the command handlers for tests

pub mod commands;
