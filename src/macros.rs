/// Increment an accounting counter by 1.
///
/// Compiles to nothing when the `stats` feature is disabled.
macro_rules! acc_inc {
    ($accounting:expr, $counter:ident) => {
        #[cfg(feature = "stats")]
        {
            $accounting.$counter.fetch_add(1, ::std::sync::atomic::Ordering::Relaxed);
        }
    };
}

/// Add a value to an accounting counter.
///
/// Compiles to nothing (including the value expression) when the `stats`
/// feature is disabled.
macro_rules! acc_add {
    ($accounting:expr, $counter:ident, $val:expr) => {
        #[cfg(feature = "stats")]
        {
            $accounting.$counter.fetch_add($val as u64, ::std::sync::atomic::Ordering::Relaxed);
        }
    };
}

pub(crate) use acc_add;
pub(crate) use acc_inc;
