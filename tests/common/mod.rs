//! Shared test utilities for the commport test suite.
//!
//! This module provides common test infrastructure including:
//! - Mock-backed ports with a shared scripting handle
//! - Scripted conversation builders
//!
//! The returned [`MockTransport`] handle shares state with the clone the
//! port owns, so tests keep scripting the link after the port has taken
//! ownership of its transport.

#![allow(dead_code)]

use commport::{MockTransport, Port, PortSettings};

/// A fresh mock-backed port, already open.
///
/// The wait deadline is shortened to 500ms so a test that hits a timeout
/// fails fast instead of stalling the suite for the default ten seconds.
pub fn open_mock(name: &str) -> (Port<MockTransport>, MockTransport) {
    open_mock_with(name, PortSettings::new().with_timeout_millis(500))
}

/// Same as [`open_mock`] with explicit settings.
pub fn open_mock_with(name: &str, settings: PortSettings) -> (Port<MockTransport>, MockTransport) {
    let mock = MockTransport::new(name);
    let mut port = Port::with_settings(mock.clone(), settings);
    port.open().expect("mock connect cannot fail unscripted");
    (port, mock)
}

/// Feed `chunks` in order and mark end-of-stream, producing a finite
/// scripted conversation.
pub fn finite_script(mock: &MockTransport, chunks: &[&[u8]]) {
    for chunk in chunks {
        mock.feed(chunk);
    }
    mock.end_of_stream();
}
