use anyhow::Result;
use rand::Rng;

use crate::error::PanelError;

/// Characters allowed in panel codes. Visually ambiguous glyphs (0/O, 1/I)
/// are excluded so a code survives being read aloud or copied by hand.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of every panel code.
pub const CODE_LENGTH: usize = 6;

/// Candidate codes drawn before allocation gives up.
const MAX_ATTEMPTS: u32 = 10;

/// Draws short share codes and allocates ones not yet taken.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeGenerator;

impl CodeGenerator {
    pub fn new() -> Self {
        CodeGenerator
    }

    /// One random candidate. `rand::rng()` is cryptographically secure, so
    /// observed codes reveal nothing about future ones.
    pub fn generate(&self) -> String {
        let mut rng = rand::rng();
        (0..CODE_LENGTH)
            .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    }

    /// Find a code for which `exists` answers false. `exists` must consult
    /// the durable store directly; a cache can hold entries for panels that
    /// were deleted moments ago.
    pub fn allocate_unique<F>(&self, mut exists: F) -> Result<String, PanelError>
    where
        F: FnMut(&str) -> Result<bool>,
    {
        for _ in 0..MAX_ATTEMPTS {
            let code = self.generate();
            if !exists(&code)? {
                return Ok(code);
            }
        }
        Err(PanelError::CodeSpaceExhausted {
            attempts: MAX_ATTEMPTS,
        })
    }
}
