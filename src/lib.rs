pub mod app;
pub mod backend;
pub mod config;
pub mod dataset;
pub mod destination;
pub mod domain;
pub mod drive;
pub mod error;
pub mod fs_util;
pub mod generator;
pub mod manifest;
pub mod naming;
pub mod output;
pub mod sftp;
pub mod source;
