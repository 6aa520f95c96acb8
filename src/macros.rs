//! # Internal Macros
//!
//! This module provides internal macros for reducing boilerplate in the
//! on-disk structures.
//!
//! ## zerocopy_accessors!
//!
//! Generates getter and setter methods for zerocopy struct fields that use
//! little-endian wrapper types (U16, U32).
//!
//! ### Usage
//!
//! ```ignore
//! use zerocopy::little_endian::{U16, U32};
//!
//! #[repr(C)]
//! struct Header {
//!     cell_count: U16,
//!     next: U32,
//! }
//!
//! impl Header {
//!     zerocopy_accessors! {
//!         cell_count: u16,
//!         next: u32,
//!     }
//! }
//!
//! // Generates:
//! // pub fn cell_count(&self) -> u16 { self.cell_count.get() }
//! // pub fn set_cell_count(&mut self, val: u16) { self.cell_count = U16::new(val); }
//! // pub fn next(&self) -> u32 { self.next.get() }
//! // pub fn set_next(&mut self, val: u32) { self.next = U32::new(val); }
//! ```

/// Generates getter and setter methods for zerocopy little-endian fields.
#[macro_export]
macro_rules! zerocopy_accessors {
    (@impl $field:ident, u16) => {
        ::paste::paste! {
            #[inline]
            pub fn $field(&self) -> u16 {
                self.$field.get()
            }

            #[inline]
            pub fn [<set_ $field>](&mut self, val: u16) {
                self.$field = ::zerocopy::little_endian::U16::new(val);
            }
        }
    };
    (@impl $field:ident, u32) => {
        ::paste::paste! {
            #[inline]
            pub fn $field(&self) -> u32 {
                self.$field.get()
            }

            #[inline]
            pub fn [<set_ $field>](&mut self, val: u32) {
                self.$field = ::zerocopy::little_endian::U32::new(val);
            }
        }
    };
    ($($field:ident : $ty:tt),* $(,)?) => {
        $(
            $crate::zerocopy_accessors!(@impl $field, $ty);
        )*
    };
}
