//! Core types and logic for tabpilot.
//!
//! This crate provides the synchronous half of AI-driven browser-tab
//! automation: a page model, accessibility snapshots, selector resolution and
//! interactions. The CLI crate wraps it in a daemon, a page host and an RPC
//! transport.
//!
//! # Modules
//!
//! - [`dom`]: In-memory page model, HTML loader and structural patterns
//! - [`aria`]: Role, accessible name and state classification
//! - [`walk`]: Flattened tree traversal across shadow roots, slots and `aria-owns`
//! - [`refs`]: Session-lifetime element references (`e1`, `e2`, …)
//! - [`snapshot`]: Accessibility-tree snapshots
//! - [`selector`]: Ref, pattern and role selectors resolved to one element
//! - [`interact`]: click, type, hover, select and press
//! - [`input`]: Key names and combos for `press`
//! - [`tab`]: Command dispatch for one tab, page loading and console buffer
//! - [`protocol`]: JSON-line request/response protocol
//! - [`error`]: API error types with actionable suggestions for AI consumers
//!
//! # Snapshot contents
//!
//! Only elements an agent can act on or navigate by are exposed:
//!
//! | Kind | Roles |
//! |------|-------|
//! | **Interactive** | button, link, textbox, checkbox, radio, combobox, searchbox, slider, spinbutton, menuitem*, tab, switch, option, treeitem |
//! | **Structural** | heading, navigation, main, banner, contentinfo, complementary, region, article, form, search |
//! | **Image** | img, only with alternative text |
//!
//! Each element carries a ref that resolves back to the same element for the
//! rest of the session, or fails with `STALE_REFERENCE` once it is gone.

pub mod aria;
pub mod dom;
pub mod error;
pub mod input;
pub mod interact;
pub mod protocol;
pub mod refs;
pub mod selector;
pub mod snapshot;
pub mod tab;
pub mod walk;
