use super::{branch_opt_util, error::PirEncodeError, params, query::QueryContext};
use num_bigint::BigUint;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Modular exponentiation primitive of the underlying cryptosystem.
pub trait ModPow: Send + Sync {
    fn mod_pow(&self, base: &BigUint, exponent: &BigUint, modulus: &BigUint) -> BigUint;
}

/// Left-to-right square-and-multiply, as implemented by `num-bigint`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SquareAndMultiply;

impl ModPow for SquareAndMultiply {
    #[inline]
    fn mod_pow(&self, base: &BigUint, exponent: &BigUint, modulus: &BigUint) -> BigUint {
        base.modpow(exponent, modulus)
    }
}

/// Precomputes `query_element^power mod N^2` for every power a partition chunk can take.
pub struct ExpTableBuilder<'a> {
    n_squared: &'a BigUint,
    max_value: usize,
    mod_pow: &'a dyn ModPow,
}

impl<'a> ExpTableBuilder<'a> {
    /// # Arguments
    ///
    /// * `n_squared` - Modulus of the cryptosystem's ciphertext space, must be at least 2.
    /// * `data_partition_bit_size` - Chunk width `w`, tables hold powers `0..=2^w - 1`. Must be in 1..=32.
    /// * `mod_pow` - Exponentiation primitive.
    pub fn new(n_squared: &'a BigUint, data_partition_bit_size: usize, mod_pow: &'a dyn ModPow) -> Result<Self, PirEncodeError> {
        if branch_opt_util::unlikely(n_squared < &BigUint::from(2u32)) {
            return Err(PirEncodeError::InvalidModulus);
        }
        if branch_opt_util::unlikely(!(1..=params::MAX_EXP_TABLE_PARTITION_BITS).contains(&data_partition_bit_size)) {
            return Err(PirEncodeError::UnsupportedPartitionBitSize(data_partition_bit_size));
        }

        Ok(Self {
            n_squared,
            max_value: (1usize << data_partition_bit_size) - 1,
            mod_pow,
        })
    }

    pub fn max_value(&self) -> usize {
        self.max_value
    }

    /// Builds the table rows of the query vector elements at `indices`. Duplicate indices are built once.
    ///
    /// Rows, and entries within a row, are independent of each other, so both are computed in parallel. The result doesn't
    /// depend on scheduling: identical inputs always give identical tables.
    pub fn build(&self, query_elements: &[BigUint], indices: &[usize]) -> Result<ExpTable, PirEncodeError> {
        let indices = indices.iter().copied().collect::<BTreeSet<_>>();

        for &index in &indices {
            let element = query_elements.get(index).ok_or(PirEncodeError::InvalidQueryIndex {
                index,
                width: query_elements.len(),
            })?;

            if branch_opt_util::unlikely(element >= self.n_squared) {
                return Err(PirEncodeError::MalformedQueryVector(format!("element at index {} isn't reduced modulo N^2", index)));
            }
        }

        let rows = indices
            .into_par_iter()
            .map(|index| {
                let element = &query_elements[index];
                let row = (0..=self.max_value)
                    .into_par_iter()
                    .map(|power| self.mod_pow.mod_pow(element, &BigUint::from(power), self.n_squared))
                    .collect::<Vec<_>>();

                (index, row)
            })
            .collect::<BTreeMap<_, _>>();

        Ok(ExpTable { max_value: self.max_value, rows })
    }
}

/// `(query index, power) -> query_element^power mod N^2`, for powers `0..=max_value` of every built index.
#[derive(Clone, Debug, PartialEq)]
pub struct ExpTable {
    max_value: usize,
    rows: BTreeMap<usize, Vec<BigUint>>,
}

impl ExpTable {
    /// Builds the rows at `indices` of a loaded query, with chunks as wide as the query's data partition bit size.
    pub fn build(ctx: &QueryContext, indices: &[usize], mod_pow: &dyn ModPow) -> Result<Self, PirEncodeError> {
        ExpTableBuilder::new(ctx.n_squared(), ctx.info().data_partition_bit_size, mod_pow)?.build(ctx.query_elements(), indices)
    }

    pub fn max_value(&self) -> usize {
        self.max_value
    }

    pub fn get(&self, index: usize, power: usize) -> Option<&BigUint> {
        self.rows.get(&index).and_then(|row| row.get(power))
    }

    /// Every power of one query element, indexed by exponent.
    pub fn powers(&self, index: usize) -> Option<&[BigUint]> {
        self.rows.get(&index).map(Vec::as_slice)
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.rows.keys().copied()
    }

    /// Total number of (index, power) entries.
    pub fn len(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// One `(query index, "power-value")` pair per entry, with `value` in decimal.
    pub fn records(&self) -> impl Iterator<Item = (usize, String)> + '_ {
        self.rows
            .iter()
            .flat_map(|(&index, row)| row.iter().enumerate().map(move |(power, value)| (index, format!("{}-{}", power, value))))
    }
}

#[cfg(test)]
mod test {
    use super::{ExpTableBuilder, ModPow, SquareAndMultiply};
    use crate::pir_internals::error::PirEncodeError;
    use num_bigint::BigUint;
    use num_traits::One;
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;
    use test_case::test_case;

    fn biguints(values: &[u64]) -> Vec<BigUint> {
        values.iter().map(|&v| BigUint::from(v)).collect()
    }

    #[test]
    fn small_table_matches_hand_computation() {
        let n_squared = BigUint::from(143u32);
        let builder = ExpTableBuilder::new(&n_squared, 2, &SquareAndMultiply).expect("valid parameters");

        let table = builder.build(&biguints(&[7]), &[0]).expect("buildable");

        assert_eq!(table.max_value(), 3);
        assert_eq!(table.powers(0), Some(biguints(&[1, 7, 49, 57]).as_slice()));
        assert_eq!(
            table.records().collect::<Vec<_>>(),
            vec![(0, "0-1".to_string()), (0, "1-7".to_string()), (0, "2-49".to_string()), (0, "3-57".to_string())]
        );
    }

    #[test]
    fn tables_are_complete_and_deterministic() {
        const DATA_PARTITION_BIT_SIZE: usize = 8;
        const WIDTH: usize = 16;

        let mut rng = ChaCha8Rng::from_os_rng();

        let mut n_bytes = [0u8; 64];
        rng.fill_bytes(&mut n_bytes);
        let n = BigUint::from_bytes_le(&n_bytes) | BigUint::one();
        let n_squared = &n * &n;

        let elements = (0..WIDTH)
            .map(|_| {
                let mut elem_bytes = [0u8; 96];
                rng.fill_bytes(&mut elem_bytes);
                BigUint::from_bytes_le(&elem_bytes) % &n_squared
            })
            .collect::<Vec<_>>();

        let builder = ExpTableBuilder::new(&n_squared, DATA_PARTITION_BIT_SIZE, &SquareAndMultiply).expect("valid parameters");
        let indices = [3, 0, 15, 3, 7];

        let table = builder.build(&elements, &indices).expect("buildable");
        let rebuilt = builder.build(&elements, &[15, 7, 3, 0]).expect("buildable");

        assert_eq!(table, rebuilt);
        assert_eq!(table.indices().collect::<Vec<_>>(), vec![0, 3, 7, 15]);
        assert_eq!(table.len(), 4 * 256);

        for index in table.indices() {
            assert_eq!(table.get(index, 0), Some(&BigUint::one()));
            assert_eq!(table.get(index, 255), Some(&elements[index].modpow(&BigUint::from(255u32), &n_squared)));
            assert_eq!(table.get(index, 256), None);

            // consecutive powers differ by one multiplication
            let row = table.powers(index).expect("row exists");
            for power in 1..row.len() {
                assert_eq!(row[power], (&row[power - 1] * &elements[index]) % &n_squared);
            }
        }
    }

    #[test_case(0, 8 => matches Err(PirEncodeError::InvalidModulus); "Zero modulus")]
    #[test_case(1, 8 => matches Err(PirEncodeError::InvalidModulus); "Unit modulus")]
    #[test_case(143, 0 => matches Err(PirEncodeError::UnsupportedPartitionBitSize(0)); "Zero width chunks")]
    #[test_case(143, 33 => matches Err(PirEncodeError::UnsupportedPartitionBitSize(33)); "Too many powers to enumerate")]
    #[test_case(143, 8 => matches Ok(255); "Byte chunks")]
    fn builder_parameters(n_squared: u32, bits: usize) -> Result<usize, PirEncodeError> {
        let n_squared = BigUint::from(n_squared);
        ExpTableBuilder::new(&n_squared, bits, &SquareAndMultiply).map(|b| b.max_value())
    }

    #[test]
    fn bad_indices_and_elements_are_rejected() {
        let n_squared = BigUint::from(143u32);
        let builder = ExpTableBuilder::new(&n_squared, 2, &SquareAndMultiply).expect("valid parameters");

        assert_eq!(builder.build(&biguints(&[7, 8]), &[2]), Err(PirEncodeError::InvalidQueryIndex { index: 2, width: 2 }));
        assert!(matches!(builder.build(&biguints(&[7, 143]), &[1]), Err(PirEncodeError::MalformedQueryVector(_))));
    }

    struct CountingModPow(std::sync::atomic::AtomicUsize);

    impl ModPow for CountingModPow {
        fn mod_pow(&self, base: &BigUint, exponent: &BigUint, modulus: &BigUint) -> BigUint {
            self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            SquareAndMultiply.mod_pow(base, exponent, modulus)
        }
    }

    #[test]
    fn exponentiation_is_delegated() {
        let n_squared = BigUint::from(143u32);
        let mod_pow = CountingModPow(Default::default());
        let builder = ExpTableBuilder::new(&n_squared, 3, &mod_pow).expect("valid parameters");

        builder.build(&biguints(&[2, 3, 5]), &[0, 2]).expect("buildable");
        assert_eq!(mod_pow.0.load(std::sync::atomic::Ordering::Relaxed), 2 * 8);
    }
}
