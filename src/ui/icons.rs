//! Shared UI icons.
//!
//! Each icon has a plain-text fallback for terminals without emoji support.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");

// File outcomes
pub static FILE_NEW: Emoji<'_, '_> = Emoji("📄 ", "+");
pub static FILE_MOD: Emoji<'_, '_> = Emoji("📝 ", "~");
pub static FILE_SAME: Emoji<'_, '_> = Emoji("  ", "=");
pub static FILE_SKIP: Emoji<'_, '_> = Emoji("🔒 ", "s");
pub static CONFLICT: Emoji<'_, '_> = Emoji("💥 ", "!");
pub static ORPHAN: Emoji<'_, '_> = Emoji("👻 ", "?");

// Changelog
pub static MIGRATION: Emoji<'_, '_> = Emoji("🚧 ", "[TODO]");
