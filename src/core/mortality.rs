use rand::Rng;

/// Nobody survives past this age; the oracle reports certain death for any
/// older age regardless of table contents.
pub const MAX_AGE: u32 = 120;

/// Mortality oracle backed by injected annual death probabilities (`qx`)
/// indexed by age, one table per sex. The actuarial data itself is an
/// external input; ages beyond the table carry no hazard below the cap.
#[derive(Debug, Clone, Default)]
pub struct MortalityTable {
    male_qx: Vec<f64>,
    female_qx: Vec<f64>,
}

impl MortalityTable {
    pub fn new(male_qx: Vec<f64>, female_qx: Vec<f64>) -> Self {
        Self { male_qx, female_qx }
    }

    /// Samples whether a male household member dies within the year at the
    /// given age.
    pub fn male_dies_at(&self, age: u32, rng: &mut impl Rng) -> bool {
        dies_at(&self.male_qx, age, rng)
    }

    /// Samples whether a female household member dies within the year at
    /// the given age.
    pub fn female_dies_at(&self, age: u32, rng: &mut impl Rng) -> bool {
        dies_at(&self.female_qx, age, rng)
    }
}

fn dies_at(qx: &[f64], age: u32, rng: &mut impl Rng) -> bool {
    if age > MAX_AGE {
        return true;
    }
    match qx.get(age as usize) {
        Some(&probability) => rng.random::<f64>() < probability,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn always_dies_past_the_cap_male() {
        let table = MortalityTable::default();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..100 {
            assert!(table.male_dies_at(121, &mut rng));
        }
    }

    #[test]
    fn always_dies_past_the_cap_female() {
        let table = MortalityTable::default();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..100 {
            assert!(table.female_dies_at(121, &mut rng));
        }
    }

    #[test]
    fn empty_table_carries_no_hazard_below_the_cap() {
        let table = MortalityTable::default();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for age in 0..=120 {
            assert!(!table.male_dies_at(age, &mut rng));
            assert!(!table.female_dies_at(age, &mut rng));
        }
    }

    #[test]
    fn certain_probability_kills_at_that_age() {
        let mut qx = vec![0.0; 121];
        qx[90] = 1.0;
        let table = MortalityTable::new(qx.clone(), qx);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        assert!(table.male_dies_at(90, &mut rng));
        assert!(table.female_dies_at(90, &mut rng));
        assert!(!table.male_dies_at(89, &mut rng));
        assert!(!table.female_dies_at(91, &mut rng));
    }
}
