//! Integration-style tests for the chat router
//!
//! Provider clients are exercised against WireMock servers; routing and
//! recovery use scripted in-process providers.

pub mod anthropic_mock_tests;
pub mod openai_mock_tests;
