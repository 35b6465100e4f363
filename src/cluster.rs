use cluster_common::ClusterError;

/// Partition of the entities of one frame into clusters.
///
/// Every entity carries the label of its cluster, which is the smallest entity
/// index in that cluster. `sizes` is indexed by label and is zero for every
/// index that is not a label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterLabeling {
    labels: Vec<usize>,
    sizes: Vec<usize>,
}

impl ClusterLabeling {
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn entity_count(&self) -> usize {
        self.labels.len()
    }

    /// `(label, size)` of every cluster, ordered by label.
    pub fn clusters(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.sizes
            .iter()
            .enumerate()
            .filter(|&(_, &size)| size > 0)
            .map(|(label, &size)| (label, size))
    }

    /// Entities carrying `label`, ascending.
    pub fn members(&self, label: usize) -> impl Iterator<Item = usize> + '_ {
        self.labels
            .iter()
            .enumerate()
            .filter(move |&(_, &l)| l == label)
            .map(|(entity, _)| entity)
    }
}

#[cfg(test)]
impl ClusterLabeling {
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn label_of(&self, entity: usize) -> usize {
        self.labels[entity]
    }

    pub fn size_of(&self, label: usize) -> usize {
        self.sizes[label]
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters().count()
    }
}

/// Turns an adjacency relation into connected components.
///
/// Disjoint-set forest with union by size and path compression. Buffers are
/// sized once and reset every frame.
#[derive(Debug)]
pub struct ClusterMerger {
    parent: Vec<usize>,
    size: Vec<usize>,
    /// Smallest entity index in the set rooted here.
    smallest: Vec<usize>,
}

impl ClusterMerger {
    pub fn new(entity_count: usize) -> Self {
        Self {
            parent: (0..entity_count).collect(),
            size: vec![1; entity_count],
            smallest: (0..entity_count).collect(),
        }
    }

    fn reset(&mut self) {
        for (k, ((parent, size), smallest)) in self
            .parent
            .iter_mut()
            .zip(self.size.iter_mut())
            .zip(self.smallest.iter_mut())
            .enumerate()
        {
            *parent = k;
            *size = 1;
            *smallest = k;
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) -> Result<(), ClusterError> {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return Ok(());
        }
        let (big, small) = if self.size[ra] >= self.size[rb] { (ra, rb) } else { (rb, ra) };
        if self.size[small] == 0 {
            return Err(ClusterError::NegativeClusterSize { label: self.smallest[small] });
        }
        self.size[big] += self.size[small];
        self.size[small] = 0;
        self.parent[small] = big;
        self.smallest[big] = self.smallest[big].min(self.smallest[small]);
        Ok(())
    }

    /// Labels every entity with the smallest index of its connected component.
    ///
    /// `adjacency[i]` lists the entities `j > i` in contact with `i`.
    pub fn merge(&mut self, adjacency: &[Vec<usize>], out: &mut ClusterLabeling) -> Result<(), ClusterError> {
        let n = self.parent.len();
        self.reset();
        for (i, row) in adjacency.iter().enumerate().take(n) {
            for &j in row {
                self.union(i, j)?;
            }
        }

        out.labels.clear();
        out.labels.resize(n, 0);
        out.sizes.clear();
        out.sizes.resize(n, 0);
        for k in 0..n {
            let root = self.find(k);
            let label = self.smallest[root];
            out.labels[k] = label;
            out.sizes[label] += 1;
        }

        for k in 0..n {
            if self.parent[k] == k && out.sizes[self.smallest[k]] != self.size[k] {
                return Err(ClusterError::PartitionMismatch {
                    counted: out.sizes.iter().sum(),
                    entities: n,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adjacency(n: usize, pairs: &[(usize, usize)]) -> Vec<Vec<usize>> {
        let mut rows = vec![Vec::new(); n];
        for &(i, j) in pairs {
            rows[i.min(j)].push(i.max(j));
        }
        rows.iter_mut().for_each(|r| r.sort_unstable());
        rows
    }

    fn merge(n: usize, pairs: &[(usize, usize)]) -> ClusterLabeling {
        let mut merger = ClusterMerger::new(n);
        let mut labeling = ClusterLabeling::default();
        merger.merge(&adjacency(n, pairs), &mut labeling).unwrap();
        labeling
    }

    fn assert_partition(labeling: &ClusterLabeling) {
        let n = labeling.entity_count();
        assert_eq!(labeling.sizes().iter().sum::<usize>(), n);
        for (label, size) in labeling.clusters() {
            assert_eq!(labeling.members(label).count(), size);
            assert_eq!(labeling.label_of(label), label);
        }
        for e in 0..n {
            assert!(labeling.size_of(labeling.label_of(e)) > 0);
        }
    }

    #[test]
    fn two_pairs_make_two_clusters() {
        let labeling = merge(4, &[(0, 1), (2, 3)]);
        assert_eq!(labeling.labels(), &[0, 0, 2, 2]);
        assert_eq!(labeling.cluster_count(), 2);
        assert_eq!(labeling.clusters().collect::<Vec<_>>(), vec![(0, 2), (2, 2)]);
        assert_partition(&labeling);
    }

    #[test]
    fn no_contacts_leave_singletons() {
        let labeling = merge(5, &[]);
        assert_eq!(labeling.cluster_count(), 5);
        assert!(labeling.sizes().iter().all(|&s| s == 1));
        assert_partition(&labeling);
    }

    #[test]
    fn single_entity_is_one_cluster() {
        let labeling = merge(1, &[]);
        assert_eq!(labeling.labels(), &[0]);
        assert_eq!(labeling.sizes(), &[1]);
    }

    #[test]
    fn label_is_smallest_member_whatever_the_merge_order() {
        // 0-3 first, then 1-2, then 1-3 joins both under label 0.
        let labeling = merge(5, &[(0, 3), (1, 2), (1, 3)]);
        assert_eq!(labeling.labels(), &[0, 0, 0, 0, 4]);
        assert_eq!(labeling.size_of(0), 4);
        assert_eq!(labeling.size_of(1), 0);
        assert_partition(&labeling);
    }

    #[test]
    fn transitive_chain_is_one_cluster() {
        let labeling = merge(6, &[(4, 5), (3, 4), (2, 3), (1, 2), (0, 1)]);
        assert_eq!(labeling.cluster_count(), 1);
        assert_eq!(labeling.size_of(0), 6);
        assert_partition(&labeling);
    }

    #[test]
    fn merger_buffers_are_reused_between_frames() {
        let mut merger = ClusterMerger::new(3);
        let mut labeling = ClusterLabeling::default();
        merger.merge(&adjacency(3, &[(0, 1), (1, 2)]), &mut labeling).unwrap();
        assert_eq!(labeling.cluster_count(), 1);
        merger.merge(&adjacency(3, &[]), &mut labeling).unwrap();
        assert_eq!(labeling.labels(), &[0, 1, 2]);
    }
}
