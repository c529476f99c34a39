//! Builder DSL and default serializers
//!
//! A [`Build`] value emits exactly one value into a writer. The [`zvec!`]
//! and [`zmap!`] macros compose builders into arrays and maps with
//! compile-time keys; [`zmap`] is the runtime-keyed equivalent. Anything
//! with a `Build` impl nests anywhere a value is expected:
//!
//! ```
//! use zerabuf::{serialize, zvec, zmap, Bin, Zera};
//!
//! let buf = serialize::<Zera>(&zmap! {
//!     "id" => 42i64,
//!     "name" => "Ada",
//!     "xs" => zvec![1i64, 2i64, 3i64],
//!     "raw" => Bin(&[0xde, 0xad]),
//! }).unwrap();
//! assert!(!buf.is_empty());
//! ```

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

use crate::buffer::ZBuffer;
use crate::error::SerializationError;
use crate::rw::{Format, RootWriter, Writer};

/// A value that, given a writer, emits exactly one value.
pub trait Build {
    fn build(&self, w: &mut dyn Writer) -> Result<(), SerializationError>;
}

/// Serialize one root value with format `F`.
pub fn serialize<F: Format>(value: &(impl Build + ?Sized)) -> Result<ZBuffer, SerializationError> {
    let mut w = F::Writer::default();
    value.build(&mut w)?;
    w.finish()
}

/// Builder backed by a closure; what the combinator macros expand to.
pub struct BuilderFn<F>(F);

impl<F> Build for BuilderFn<F>
where
    F: Fn(&mut dyn Writer) -> Result<(), SerializationError>,
{
    fn build(&self, w: &mut dyn Writer) -> Result<(), SerializationError> {
        (self.0)(w)
    }
}

/// Wrap a closure as a builder.
pub fn from_fn<F>(f: F) -> BuilderFn<F>
where
    F: Fn(&mut dyn Writer) -> Result<(), SerializationError>,
{
    BuilderFn(f)
}

/// Byte-span newtype; emits a blob. Bare `&[u8]`/`Vec<u8>` go through the
/// sequence impls and would encode as an array of uints instead.
pub struct Bin<'a>(pub &'a [u8]);

impl Build for Bin<'_> {
    fn build(&self, w: &mut dyn Writer) -> Result<(), SerializationError> {
        w.binary(self.0)
    }
}

/// Map builder over runtime entries (the keyed counterpart of `Vec<T>`).
pub fn zmap<K, V>(entries: Vec<(K, V)>) -> impl Build
where
    K: AsRef<str>,
    V: Build,
{
    from_fn(move |w| {
        w.begin_map(entries.len())?;
        for (k, v) in &entries {
            w.key(k.as_ref())?;
            v.build(w)?;
        }
        w.end_map()
    })
}

/// Array builder: `zvec![a, b, c]`. Elements may be primitives or nested
/// builders.
#[macro_export]
macro_rules! zvec {
    ($($v:expr),* $(,)?) => {{
        $crate::build::from_fn(|w: &mut dyn $crate::Writer| {
            w.begin_array($crate::zcount!($($v),*))?;
            $( $crate::Build::build(&$v, w)?; )*
            w.end_array()
        })
    }};
}

/// Map builder with literal keys: `zmap! { "a" => 1i64, "b" => zvec![2i64] }`.
#[macro_export]
macro_rules! zmap {
    ($($k:expr => $v:expr),* $(,)?) => {{
        $crate::build::from_fn(|w: &mut dyn $crate::Writer| {
            w.begin_map($crate::zcount!($($k),*))?;
            $( w.key(::std::convert::AsRef::<str>::as_ref(&$k))?; $crate::Build::build(&$v, w)?; )*
            w.end_map()
        })
    }};
}

#[doc(hidden)]
#[macro_export]
macro_rules! zcount {
    () => { 0usize };
    ($head:expr $(, $tail:expr)*) => { 1usize + $crate::zcount!($($tail),*) };
}

// ---- default serializers ------------------------------------------------

impl Build for () {
    fn build(&self, w: &mut dyn Writer) -> Result<(), SerializationError> {
        w.null()
    }
}

impl<T: Build> Build for Option<T> {
    fn build(&self, w: &mut dyn Writer) -> Result<(), SerializationError> {
        match self {
            Some(v) => v.build(w),
            None => w.null(),
        }
    }
}

impl Build for bool {
    fn build(&self, w: &mut dyn Writer) -> Result<(), SerializationError> {
        w.boolean(*self)
    }
}

macro_rules! build_signed {
    ($($t:ty),*) => {$(
        impl Build for $t {
            fn build(&self, w: &mut dyn Writer) -> Result<(), SerializationError> {
                w.int64(*self as i64)
            }
        }
    )*};
}

macro_rules! build_unsigned {
    ($($t:ty),*) => {$(
        impl Build for $t {
            fn build(&self, w: &mut dyn Writer) -> Result<(), SerializationError> {
                w.uint64(*self as u64)
            }
        }
    )*};
}

build_signed!(i8, i16, i32, i64, isize);
build_unsigned!(u8, u16, u32, u64, usize);

impl Build for f32 {
    fn build(&self, w: &mut dyn Writer) -> Result<(), SerializationError> {
        w.float64(f64::from(*self))
    }
}

impl Build for f64 {
    fn build(&self, w: &mut dyn Writer) -> Result<(), SerializationError> {
        w.float64(*self)
    }
}

impl Build for str {
    fn build(&self, w: &mut dyn Writer) -> Result<(), SerializationError> {
        w.string(self)
    }
}

impl Build for String {
    fn build(&self, w: &mut dyn Writer) -> Result<(), SerializationError> {
        w.string(self)
    }
}

impl Build for Cow<'_, str> {
    fn build(&self, w: &mut dyn Writer) -> Result<(), SerializationError> {
        w.string(self)
    }
}

impl<T: Build + ?Sized> Build for &T {
    fn build(&self, w: &mut dyn Writer) -> Result<(), SerializationError> {
        (**self).build(w)
    }
}

impl<T: Build> Build for [T] {
    fn build(&self, w: &mut dyn Writer) -> Result<(), SerializationError> {
        w.begin_array(self.len())?;
        for v in self {
            v.build(w)?;
        }
        w.end_array()
    }
}

impl<T: Build, const N: usize> Build for [T; N] {
    fn build(&self, w: &mut dyn Writer) -> Result<(), SerializationError> {
        self.as_slice().build(w)
    }
}

impl<T: Build> Build for Vec<T> {
    fn build(&self, w: &mut dyn Writer) -> Result<(), SerializationError> {
        self.as_slice().build(w)
    }
}

impl<K: AsRef<str>, V: Build> Build for BTreeMap<K, V> {
    fn build(&self, w: &mut dyn Writer) -> Result<(), SerializationError> {
        w.begin_map(self.len())?;
        for (k, v) in self {
            w.key(k.as_ref())?;
            v.build(w)?;
        }
        w.end_map()
    }
}

impl<K: AsRef<str>, V: Build> Build for HashMap<K, V> {
    fn build(&self, w: &mut dyn Writer) -> Result<(), SerializationError> {
        w.begin_map(self.len())?;
        for (k, v) in self {
            w.key(k.as_ref())?;
            v.build(w)?;
        }
        w.end_map()
    }
}
