//! Prefix sums over block heights (Fenwick tree).
//!
//! Gives `O(log n)` block offsets and offset-to-block lookups, which is what keeps scrolling
//! through a very large manuscript independent of its size.

#[derive(Debug, Clone, Default)]
pub(crate) struct HeightIndex {
    tree: Vec<f32>,
    values: Vec<f32>,
}

impl HeightIndex {
    pub fn from_heights(heights: &[f32]) -> Self {
        let n = heights.len();
        let mut tree = vec![0.0; n + 1];
        for (i, h) in heights.iter().enumerate() {
            tree[i + 1] += h;
            let parent = (i + 1) + ((i + 1) & (i + 1).wrapping_neg());
            if parent <= n {
                tree[parent] += tree[i + 1];
            }
        }
        Self {
            tree,
            values: heights.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn get(&self, i: usize) -> f32 {
        self.values.get(i).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, i: usize, height: f32) {
        let Some(old) = self.values.get_mut(i) else {
            return;
        };
        let delta = height - *old;
        *old = height;
        let mut k = i + 1;
        while k < self.tree.len() {
            self.tree[k] += delta;
            k += k & k.wrapping_neg();
        }
    }

    /// Sum of the first `count` heights.
    pub fn prefix(&self, count: usize) -> f32 {
        let mut k = count.min(self.values.len());
        let mut sum = 0.0;
        while k > 0 {
            sum += self.tree[k];
            k -= k & k.wrapping_neg();
        }
        sum
    }

    pub fn total(&self) -> f32 {
        self.prefix(self.values.len())
    }

    /// Index of the entry covering offset `y` (clamped to the last entry).
    pub fn find(&self, y: f32) -> usize {
        let n = self.values.len();
        if n == 0 {
            return 0;
        }
        let mut pos = 0;
        let mut remaining = y;
        let mut step = n.next_power_of_two();
        while step > 0 {
            let next = pos + step;
            if next <= n && self.tree[next] <= remaining {
                pos = next;
                remaining -= self.tree[next];
            }
            step >>= 1;
        }
        pos.min(n - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_and_find() {
        let mut index = HeightIndex::from_heights(&[10.0, 20.0, 30.0, 40.0, 50.0]);
        assert_eq!(index.prefix(0), 0.0);
        assert_eq!(index.prefix(3), 60.0);
        assert_eq!(index.total(), 150.0);
        assert_eq!(index.find(0.0), 0);
        assert_eq!(index.find(9.9), 0);
        assert_eq!(index.find(10.0), 1);
        assert_eq!(index.find(59.0), 2);
        assert_eq!(index.find(1000.0), 4);
        index.set(1, 5.0);
        assert_eq!(index.prefix(2), 15.0);
        assert_eq!(index.find(14.0), 1);
        assert_eq!(index.find(15.0), 2);
    }
}
