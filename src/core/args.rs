//! Argument serialisation for log calls
//!
//! Every value passed to a log call implements [`LogArg`]. Scalars are
//! copied by value and strings are deep-copied into the record up to the
//! sink's inline limit. Two opt-in wrappers change that:
//!
//! * [`nocopy`] and [`nocopy_unchecked`] store only the address of a string.
//!   `nocopy` requires a `'static` string. `nocopy_unchecked` accepts any
//!   string and is `unsafe`: the caller keeps the string alive until the
//!   consumer has rendered the record, usually by calling
//!   [`Sink::sync`](super::sink::Sink::sync) before releasing it.
//! * [`display`] and [`debug`] format an arbitrary value on the calling
//!   thread and copy the resulting text.
//!
//! `Arc<str>` arguments travel by reference count: the record owns one
//! count until the consumer renders it.

use super::record::{CountingWriter, Encoder};
use std::borrow::Cow;
use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

/// A value that can be serialised into a log record
pub trait LogArg {
    /// Number of bytes [`encode`](LogArg::encode) will write
    ///
    /// Fails if the value cannot be formatted.
    fn encoded_len(&self, max_inline: usize) -> Result<usize, fmt::Error>;

    fn encode(&self, encoder: &mut Encoder<'_>);
}

/// A fixed list of log arguments, implemented for tuples of up to twelve
/// [`LogArg`] values
pub trait LogArgs {
    const COUNT: usize;

    fn encoded_len(&self, max_inline: usize) -> Result<usize, fmt::Error>;

    fn encode(&self, encoder: &mut Encoder<'_>);
}

impl<T: LogArg + ?Sized> LogArg for &T {
    #[inline]
    fn encoded_len(&self, max_inline: usize) -> Result<usize, fmt::Error> {
        (**self).encoded_len(max_inline)
    }

    #[inline]
    fn encode(&self, encoder: &mut Encoder<'_>) {
        (**self).encode(encoder)
    }
}

macro_rules! impl_integer {
    ($method:ident as $wide:ty, $len:expr; $($t:ty),*) => {
        $(
            impl LogArg for $t {
                #[inline]
                fn encoded_len(&self, _max_inline: usize) -> Result<usize, fmt::Error> {
                    Ok($len)
                }

                #[inline]
                fn encode(&self, encoder: &mut Encoder<'_>) {
                    encoder.$method(*self as $wide)
                }
            }
        )*
    };
}

// signed values keep their width so radix formatting matches the source type
impl_integer!(i8 as i8, 2; i8);
impl_integer!(i16 as i16, 3; i16);
impl_integer!(i32 as i32, 5; i32);
impl_integer!(i64 as i64, 9; i64);
#[cfg(target_pointer_width = "64")]
impl_integer!(i64 as i64, 9; isize);
#[cfg(target_pointer_width = "32")]
impl_integer!(i32 as i32, 5; isize);
#[cfg(target_pointer_width = "16")]
impl_integer!(i16 as i16, 3; isize);
impl_integer!(u64 as u64, 9; u8, u16, u32, u64, usize);
impl_integer!(i128 as i128, 17; i128);
impl_integer!(u128 as u128, 17; u128);
impl_integer!(f32 as f32, 5; f32);
impl_integer!(f64 as f64, 9; f64);

impl LogArg for bool {
    fn encoded_len(&self, _max_inline: usize) -> Result<usize, fmt::Error> {
        Ok(2)
    }

    fn encode(&self, encoder: &mut Encoder<'_>) {
        encoder.bool(*self)
    }
}

impl LogArg for char {
    fn encoded_len(&self, _max_inline: usize) -> Result<usize, fmt::Error> {
        Ok(5)
    }

    fn encode(&self, encoder: &mut Encoder<'_>) {
        encoder.char(*self)
    }
}

impl LogArg for str {
    #[inline]
    fn encoded_len(&self, max_inline: usize) -> Result<usize, fmt::Error> {
        Ok(Encoder::str_len(self, max_inline))
    }

    #[inline]
    fn encode(&self, encoder: &mut Encoder<'_>) {
        encoder.str(self)
    }
}

impl LogArg for String {
    fn encoded_len(&self, max_inline: usize) -> Result<usize, fmt::Error> {
        self.as_str().encoded_len(max_inline)
    }

    fn encode(&self, encoder: &mut Encoder<'_>) {
        encoder.str(self)
    }
}

impl LogArg for Cow<'_, str> {
    fn encoded_len(&self, max_inline: usize) -> Result<usize, fmt::Error> {
        self.as_ref().encoded_len(max_inline)
    }

    fn encode(&self, encoder: &mut Encoder<'_>) {
        encoder.str(self)
    }
}

impl LogArg for Box<str> {
    fn encoded_len(&self, max_inline: usize) -> Result<usize, fmt::Error> {
        (**self).encoded_len(max_inline)
    }

    fn encode(&self, encoder: &mut Encoder<'_>) {
        encoder.str(self)
    }
}

impl LogArg for Arc<str> {
    fn encoded_len(&self, _max_inline: usize) -> Result<usize, fmt::Error> {
        Ok(17)
    }

    fn encode(&self, encoder: &mut Encoder<'_>) {
        encoder.shared_str(Arc::clone(self))
    }
}

impl<T: LogArg> LogArg for Option<T> {
    fn encoded_len(&self, max_inline: usize) -> Result<usize, fmt::Error> {
        match self {
            Some(value) => Ok(1 + value.encoded_len(max_inline)?),
            None => Ok(1),
        }
    }

    fn encode(&self, encoder: &mut Encoder<'_>) {
        match self {
            Some(value) => {
                encoder.some();
                value.encode(encoder);
            }
            None => encoder.none(),
        }
    }
}

/// A string logged by address
#[derive(Clone, Copy)]
pub struct NoCopy<'a>(&'a str);

/// Log a `'static` string without copying it
#[inline]
pub fn nocopy(s: &'static str) -> NoCopy<'static> {
    NoCopy(s)
}

/// Log any string without copying it
///
/// # Safety
///
/// `s` must remain valid and unchanged until the consumer has rendered the
/// record, for example until a subsequent `sync()` on the same sink returns.
#[inline]
pub unsafe fn nocopy_unchecked(s: &str) -> NoCopy<'_> {
    NoCopy(s)
}

impl NoCopy<'_> {
    pub fn as_str(&self) -> &str {
        self.0
    }
}

impl fmt::Display for NoCopy<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.0, f)
    }
}

impl fmt::Debug for NoCopy<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.0, f)
    }
}

impl LogArg for NoCopy<'_> {
    fn encoded_len(&self, _max_inline: usize) -> Result<usize, fmt::Error> {
        Ok(17)
    }

    fn encode(&self, encoder: &mut Encoder<'_>) {
        // SAFETY: a NoCopy is either 'static or was built through
        // nocopy_unchecked, whose caller upholds the lifetime.
        unsafe { encoder.str_ref(self.0) }
    }
}

fn formatted_len(measured: &Cell<usize>, args: fmt::Arguments<'_>, max_inline: usize) -> Result<usize, fmt::Error> {
    let mut counter = CountingWriter(0);
    fmt::write(&mut counter, args)?;
    measured.set(counter.0);
    if counter.0 > max_inline {
        Ok(1)
    } else {
        Ok(1 + 8 + counter.0)
    }
}

/// A value formatted with `Display` on the calling thread
pub struct DisplayArg<T> {
    value: T,
    measured: Cell<usize>,
}

/// Capture the `Display` rendering of any value
pub fn display<T: fmt::Display>(value: T) -> DisplayArg<T> {
    DisplayArg {
        value,
        measured: Cell::new(0),
    }
}

impl<T: fmt::Display> fmt::Display for DisplayArg<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

impl<T: fmt::Display> fmt::Debug for DisplayArg<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

impl<T: fmt::Display> LogArg for DisplayArg<T> {
    fn encoded_len(&self, max_inline: usize) -> Result<usize, fmt::Error> {
        formatted_len(&self.measured, format_args!("{}", self.value), max_inline)
    }

    fn encode(&self, encoder: &mut Encoder<'_>) {
        let measured = self.measured.get();
        if measured > encoder.max_inline() {
            encoder.truncated();
        } else {
            encoder.formatted(measured, self);
        }
    }
}

/// A value formatted with `Debug` on the calling thread
pub struct DebugArg<T> {
    value: T,
    measured: Cell<usize>,
}

/// Capture the `Debug` rendering of any value
pub fn debug<T: fmt::Debug>(value: T) -> DebugArg<T> {
    DebugArg {
        value,
        measured: Cell::new(0),
    }
}

impl<T: fmt::Debug> fmt::Display for DebugArg<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

impl<T: fmt::Debug> fmt::Debug for DebugArg<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

impl<T: fmt::Debug> LogArg for DebugArg<T> {
    fn encoded_len(&self, max_inline: usize) -> Result<usize, fmt::Error> {
        formatted_len(&self.measured, format_args!("{:?}", self.value), max_inline)
    }

    fn encode(&self, encoder: &mut Encoder<'_>) {
        let measured = self.measured.get();
        if measured > encoder.max_inline() {
            encoder.truncated();
        } else {
            encoder.formatted(measured, self);
        }
    }
}

impl LogArgs for () {
    const COUNT: usize = 0;

    fn encoded_len(&self, _max_inline: usize) -> Result<usize, fmt::Error> {
        Ok(0)
    }

    fn encode(&self, _encoder: &mut Encoder<'_>) {}
}

macro_rules! impl_tuple {
    ($count:expr; $($name:ident $idx:tt),+) => {
        impl<$($name: LogArg),+> LogArgs for ($($name,)+) {
            const COUNT: usize = $count;

            #[inline]
            fn encoded_len(&self, max_inline: usize) -> Result<usize, fmt::Error> {
                let mut len = 0;
                $(len += self.$idx.encoded_len(max_inline)?;)+
                Ok(len)
            }

            #[inline]
            fn encode(&self, encoder: &mut Encoder<'_>) {
                $(self.$idx.encode(encoder);)+
            }
        }
    };
}

impl_tuple!(1; A 0);
impl_tuple!(2; A 0, B 1);
impl_tuple!(3; A 0, B 1, C 2);
impl_tuple!(4; A 0, B 1, C 2, D 3);
impl_tuple!(5; A 0, B 1, C 2, D 3, E 4);
impl_tuple!(6; A 0, B 1, C 2, D 3, E 4, F 5);
impl_tuple!(7; A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_tuple!(8; A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);
impl_tuple!(9; A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8);
impl_tuple!(10; A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8, J 9);
impl_tuple!(11; A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8, J 9, K 10);
impl_tuple!(12; A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8, J 9, K 10, L 11);
