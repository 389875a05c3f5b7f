//! Named scene colours.
//!
//! Colours are authored as sRGB hex and stored linear, since the render
//! target is an sRGB surface.

use glam::Vec3;

/// Deep emerald green.
pub const EMERALD: u32 = 0x004225;
/// Metallic gold.
pub const GOLD: u32 = 0xD4AF37;
/// Silver.
pub const SILVER: u32 = 0xC0C0C0;
/// Dark red.
pub const RED: u32 = 0x8B0000;
/// Warm yellow light.
pub const WARM_LIGHT: u32 = 0xFFD700;

/// Default ornament palette.
pub const ORNAMENT_PALETTE: [u32; 4] = [GOLD, RED, SILVER, WARM_LIGHT];

/// Default photo tints for the panels.
pub const PANEL_PALETTE: [u32; 4] = [EMERALD, RED, GOLD, SILVER];

/// Convert a `0xRRGGBB` sRGB colour to linear RGB.
pub fn hex_to_linear(hex: u32) -> Vec3 {
    let channel = |shift: u32| srgb_to_linear(((hex >> shift) & 0xFF) as f32 / 255.0);
    Vec3::new(channel(16), channel(8), channel(0))
}

/// sRGB transfer function, inverse.
pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Resolve a list of hex colours to linear RGB.
pub fn resolve(hexes: &[u32]) -> Vec<Vec3> {
    hexes.iter().copied().map(hex_to_linear).collect()
}
