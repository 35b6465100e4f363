use anyhow::{Context, Result};
use log::debug;
use serde::Deserialize;
use std::ops::Range;
use std::path::Path;

/// One run of identical molecules in a topology file.
#[derive(Debug, Clone, Deserialize)]
pub struct MoleculeBlock {
    pub name: String,
    pub count: usize,
    /// Mass (amu) of each particle of one molecule, in order.
    pub masses: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct TopologyFile {
    molecules: Vec<MoleculeBlock>,
}

/// Particle masses and the molecule partition of the system.
#[derive(Debug, Clone)]
pub struct Topology {
    /// Contiguous particle range of every molecule, in particle order.
    pub molecules: Vec<Range<usize>>,
    pub masses: Vec<f32>,
}

impl Topology {
    /// Loads a TOML topology descriptor made of `[[molecules]]` blocks.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let content = std::fs::read_to_string(path_ref)
            .with_context(|| format!("Failed to read topology file '{}'", path_ref.display()))?;
        let file: TopologyFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse topology '{}'", path_ref.display()))?;
        for block in &file.molecules {
            debug!("Molecule block '{}': {} x {} particles", block.name, block.count, block.masses.len());
        }
        Ok(Self::from_blocks(&file.molecules))
    }

    /// Expands molecule blocks into consecutive particle ranges.
    pub fn from_blocks(blocks: &[MoleculeBlock]) -> Self {
        let mut molecules = Vec::new();
        let mut masses = Vec::new();
        for block in blocks {
            for _ in 0..block.count {
                let start = masses.len();
                masses.extend_from_slice(&block.masses);
                molecules.push(start..masses.len());
            }
        }
        Topology { molecules, masses }
    }

    pub fn particle_count(&self) -> usize {
        self.masses.len()
    }
}

/// A named group of 0-based particle indices.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexGroup {
    pub name: String,
    pub indices: Vec<usize>,
}

/// Parses a GROMACS `.ndx` file: `[ name ]` headers followed by 1-based particle numbers.
pub fn parse_index_groups(content: &str) -> Result<Vec<IndexGroup>> {
    let mut groups: Vec<IndexGroup> = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') {
            continue;
        }
        if let Some(header) = line.strip_prefix('[') {
            let name = header.trim_end_matches(']').trim().to_string();
            groups.push(IndexGroup { name, indices: Vec::new() });
            continue;
        }
        let group = groups
            .last_mut()
            .with_context(|| format!("line {}: index entries before any group header", line_no + 1))?;
        for token in line.split_whitespace() {
            let number: usize = token
                .parse()
                .with_context(|| format!("line {}: '{}' is not a particle number", line_no + 1, token))?;
            if number == 0 {
                anyhow::bail!("line {}: particle numbers start at 1", line_no + 1);
            }
            group.indices.push(number - 1);
        }
    }
    Ok(groups)
}

/// Reads one group from an index file, the first one when `group` is `None`.
pub fn load_index_group<P: AsRef<Path>>(path: P, group: Option<&str>) -> Result<IndexGroup> {
    let path_ref = path.as_ref();
    let content = std::fs::read_to_string(path_ref)
        .with_context(|| format!("Failed to read index file '{}'", path_ref.display()))?;
    let groups = parse_index_groups(&content)
        .with_context(|| format!("Failed to parse index file '{}'", path_ref.display()))?;
    let selected = match group {
        Some(name) => groups.into_iter().find(|g| g.name == name),
        None => groups.into_iter().next(),
    };
    selected.with_context(|| {
        format!(
            "Index group {} not found in '{}'",
            group.unwrap_or("<first>"),
            path_ref.display()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn blocks_expand_to_consecutive_molecules() {
        let topology = Topology::from_blocks(&[
            MoleculeBlock { name: "DIM".into(), count: 2, masses: vec![12.0, 12.0] },
            MoleculeBlock { name: "SOL".into(), count: 1, masses: vec![16.0, 1.0, 1.0] },
        ]);
        assert_eq!(topology.molecules, vec![0..2, 2..4, 4..7]);
        assert_eq!(topology.particle_count(), 7);
        assert_eq!(topology.masses[4], 16.0);
    }

    #[test]
    fn load_topology_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "[[molecules]]\nname = \"AR\"\ncount = 3\nmasses = [39.948]\n"
        )
        .unwrap();
        let topology = Topology::load(file.path()).unwrap();
        assert_eq!(topology.molecules.len(), 3);
        assert_eq!(topology.molecules[2], 2..3);
    }

    #[test]
    fn parse_ndx_groups() {
        let groups = parse_index_groups("[ System ]\n1 2 3\n4\n\n[ Ions ]\n 7  9 \n").unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "System");
        assert_eq!(groups[0].indices, vec![0, 1, 2, 3]);
        assert_eq!(groups[1].indices, vec![6, 8]);
    }

    #[test]
    fn ndx_rejects_entries_without_group_and_zero() {
        assert!(parse_index_groups("1 2 3\n").is_err());
        assert!(parse_index_groups("[ a ]\n0\n").is_err());
    }

    #[test]
    fn load_named_group() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[ A ]\n1\n[ B ]\n5 6\n").unwrap();
        let group = load_index_group(file.path(), Some("B")).unwrap();
        assert_eq!(group.indices, vec![4, 5]);
        assert_eq!(load_index_group(file.path(), None).unwrap().name, "A");
        assert!(load_index_group(file.path(), Some("C")).is_err());
    }
}
