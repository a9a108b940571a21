//! Optional parallel processing using rayon.
//!
//! Enable with the `parallel` feature flag. Without it the same calls run
//! sequentially; results come back in input order either way, so output
//! does not depend on the feature.

use crate::error::Result;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Apply `f` to every item, stopping at the first error.
///
/// Each call must be independent: speed trials and per-channel embedding
/// build their own FFT plans.
#[cfg(feature = "parallel")]
pub fn try_map<T, R, F>(items: &[T], f: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> Result<R> + Sync + Send,
{
    items.par_iter().map(f).collect()
}

#[cfg(not(feature = "parallel"))]
pub fn try_map<T, R, F>(items: &[T], f: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> Result<R> + Sync + Send,
{
    items.iter().map(f).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn keeps_input_order() {
        let items: Vec<u32> = (0..100).collect();
        let out = try_map(&items, |&x| Ok(x * 2)).unwrap();
        assert_eq!(out, (0..100).map(|x| x * 2).collect::<Vec<_>>());
    }

    #[test]
    fn propagates_errors() {
        let items = [1, 2, 3];
        let out: Result<Vec<i32>> = try_map(&items, |&x| {
            if x == 2 {
                Err(Error::InvalidConfig("two".to_string()))
            } else {
                Ok(x)
            }
        });
        assert!(matches!(out, Err(Error::InvalidConfig(_))));
    }
}
