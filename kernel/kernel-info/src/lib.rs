//! # Boot information and kernel configuration
//!
//! Everything the kernel knows *about itself* before its own subsystems are
//! up: the Multiboot 1 information block handed over by the bootloader
//! ([`boot`]), the fixed memory-layout constants ([`memory`]), and the boot
//! command line ([`cmdline`]).

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod boot;
pub mod cmdline;
pub mod memory;
pub mod segments;
