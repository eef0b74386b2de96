//! End-to-end tests at the HTTP request/response level.
//!
//! Each test file covers a specific scenario, driving the full auth router
//! (middlewares included) over an in-memory registry.

#![cfg(test)]

mod helpers;

mod test_logout;
mod test_me;
mod test_oauth2_callback;
mod test_register;
mod test_login;
mod test_request_id;
