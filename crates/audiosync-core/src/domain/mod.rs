//! Domain entities for AudioSync.
//!
//! This module contains plain data types with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! The innermost layer of the code base is the **domain**.  Domain code has no
//! imports from OS APIs, audio drivers, network libraries, or UI frameworks,
//! so it compiles and tests on any platform without setup.
//!
//! Outer layers (the server's application and infrastructure modules) depend
//! on these types; the domain never depends on them.

/// Timestamped unit of audio produced by a source.
pub mod frame;

/// Client identity and the read-only roster view shown to observers.
pub mod client;
