/// Returns a `Box<[T]>` of length `len` filled with `elem`.
#[inline(always)]
pub fn boxed_slice<T: Clone>(elem: T, len: usize) -> Box<[T]> {
    vec![elem; len].into_boxed_slice()
}

/// Returns a `Box<[T; LEN]>` filled with `elem`.
#[inline(always)]
pub fn boxed_array<T: Clone, const LEN: usize>(elem: T) -> Box<[T; LEN]> {
    let slice = boxed_slice(elem, LEN);
    match slice.try_into() {
        Ok(array) => array,
        Err(_) => unreachable!("slice has exactly LEN elements"),
    }
}

/// Like offset_of, except it also supports indexing arrays
#[macro_export]
macro_rules! offset_of {
    ($t:ty, $($path:tt)+) => {{
        const OFFSET: usize = {
            let data = core::mem::MaybeUninit::<$t>::uninit();
            let ptr = data.as_ptr();
            unsafe { (&raw const (*ptr).$($path)+).byte_offset_from(ptr) as usize }
        };

        OFFSET
    }}
}
