// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::num::NonZeroUsize;

/// Estimate of the parallelism available to this process.
///
/// [`std::thread::available_parallelism`] can fail on some platforms, in which
/// case a single worker is used. The value is not cached since it may change
/// while the process runs.
pub(crate) fn available_parallelism() -> NonZeroUsize {
    std::thread::available_parallelism().unwrap_or_else(|err| {
        tracing::debug!("Failed to detect available parallelism, using 1: {err}");
        NonZeroUsize::MIN
    })
}

pub(crate) mod bin {
    use std::marker::PhantomData;

    struct Bin<T> {
        weight: u64,
        items: Vec<T>,
    }

    impl<T> Bin<T> {
        fn new() -> Self {
            Bin {
                weight: 0,
                items: Vec::new(),
            }
        }

        fn can_add(&self, weight: u64, target_weight: u64) -> bool {
            self.weight.saturating_add(weight) <= target_weight
        }

        fn add(&mut self, item: T, weight: u64) {
            self.weight = self.weight.saturating_add(weight);
            self.items.push(item);
        }
    }

    /// Packs items into bins whose total weight stays under a target.
    ///
    /// An item heavier than the target gets a bin of its own.
    pub(crate) struct ListPacker<T> {
        target_weight: u64,
        _marker: PhantomData<T>,
    }

    impl<T> ListPacker<T> {
        pub fn new(target_weight: u64) -> Self {
            ListPacker {
                target_weight,
                _marker: PhantomData,
            }
        }

        /// Packs items starting from the end of the list, keeping a single
        /// bin open at a time.
        ///
        /// The last items fill complete bins and whatever remains lands in
        /// the first bin. Items and bins keep the input order.
        pub fn pack_end<F>(&self, items: Vec<T>, weight_func: F) -> Vec<Vec<T>>
        where F: Fn(&T) -> u64 {
            let mut bins: Vec<Bin<T>> = vec![];
            for item in items.into_iter().rev() {
                let weight = weight_func(&item);
                match bins.last_mut() {
                    Some(bin) if bin.can_add(weight, self.target_weight) => bin.add(item, weight),
                    _ => {
                        let mut bin = Bin::new();
                        bin.add(item, weight);
                        bins.push(bin);
                    }
                }
            }

            bins.into_iter()
                .rev()
                .map(|bin| bin.items.into_iter().rev().collect())
                .collect()
        }
    }

    #[cfg(test)]
    mod tests {
        use pretty_assertions::assert_eq;

        use super::*;

        #[test]
        fn test_oversized_item_gets_own_bin() {
            let packer = ListPacker::new(10);

            let packed = packer.pack_end(vec![15, 5, 3], |&x| x);

            assert_eq!(packed, vec![vec![15], vec![5, 3]]);
        }

        #[test]
        fn test_pack_end_fills_bins_from_the_end() {
            let packer = ListPacker::new(10);

            let packed = packer.pack_end(vec![1, 2, 6, 3, 5, 4], |&x| x);

            assert_eq!(packed, vec![vec![1, 2], vec![6, 3], vec![5, 4]]);
        }

        #[test]
        fn test_empty_input() {
            let packer = ListPacker::new(10);

            let packed = packer.pack_end(Vec::<u64>::new(), |&x| x);

            assert!(packed.is_empty());
        }
    }
}
