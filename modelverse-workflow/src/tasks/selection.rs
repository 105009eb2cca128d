use modelverse_core::{EvaluationConfig, Subset};
use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::SeedableRng;

/// Pick the subjects and samples an evaluation run will cover.
///
/// Subjects are sorted by name and then shuffled with a generator seeded from
/// `config.seed`, so the provider's ordering never affects the outcome. The
/// first `max_subjects` are kept and each is cut down to
/// [`EvaluationConfig::sample_count`] samples drawn from the same generator.
pub fn select_subjects(mut subsets: Vec<Subset>, config: &EvaluationConfig) -> Vec<Subset> {
    let mut rng = StdRng::seed_from_u64(config.seed);

    subsets.sort_by(|a, b| a.name.cmp(&b.name));
    subsets.shuffle(&mut rng);
    subsets.truncate(config.max_subjects);

    subsets
        .into_iter()
        .map(|subset| {
            let count = config.sample_count(subset.len());
            if count >= subset.len() {
                return subset;
            }
            let mut picked = index::sample(&mut rng, subset.len(), count).into_vec();
            picked.sort_unstable();

            let Subset { name, mut samples } = subset;
            let mut kept = Vec::with_capacity(count);
            for (position, sample) in samples.drain(..).enumerate() {
                if picked.binary_search(&position).is_ok() {
                    kept.push(sample);
                }
            }
            Subset::new(name, kept)
        })
        .collect()
}
