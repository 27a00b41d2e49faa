use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use crate::config::MrConfig;
use crate::error::{MrError, Result};

pub fn run_in_pool<T, F>(cores: Option<usize>, context: &'static str, f: F) -> Result<T>
where
    F: FnOnce() -> T + Send,
    T: Send,
{
    if let Some(cores) = cores {
        let pool = ThreadPoolBuilder::new()
            .num_threads(cores)
            .build()
            .map_err(|e| MrError::ThreadPool(format!("{context}: {e}")))?;
        Ok(pool.install(f))
    } else {
        Ok(f())
    }
}

pub fn resolve_threads(cores: Option<usize>, tasks: usize) -> Option<usize> {
    if let Some(cores) = cores {
        let capped = cores.min(tasks.max(1));
        if cores > capped {
            tracing::warn!(
                "Provided cores ({cores}) greater than number of tasks ({tasks}); using {capped}"
            );
        }
        Some(capped)
    } else {
        None
    }
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Independent generator for replicate `index` of a stream rooted at `base`.
pub fn replicate_rng(base: u64, index: usize) -> StdRng {
    StdRng::seed_from_u64(splitmix64(base ^ splitmix64(index as u64)))
}

/// Runs `n` replicates, each on its own seeded stream drawn from `rng`.
///
/// Output order and values do not depend on `config.parallel` or the
/// number of threads.
pub fn map_replicates<T, F>(
    rng: &mut StdRng,
    n: usize,
    config: &MrConfig,
    context: &'static str,
    f: F,
) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(&mut StdRng) -> T + Sync + Send,
{
    let base: u64 = rng.random();
    if config.parallel {
        let cores = resolve_threads(config.cores, n);
        run_in_pool(cores, context, || {
            (0..n)
                .into_par_iter()
                .map(|i| f(&mut replicate_rng(base, i)))
                .collect::<Vec<T>>()
        })
    } else {
        Ok((0..n).map(|i| f(&mut replicate_rng(base, i))).collect())
    }
}
