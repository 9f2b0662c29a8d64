use super::*;
use std::fmt;

impl fmt::Debug for PayloadArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_payload_arena(self, f)
    }
}
