//! io/atlas.rs — surface atlas: per-hemisphere labelings plus label names.
//!
//! FreeSurfer `.annot` files carry both; the colortable row is the label id.
//! Text labelings need a names file with one name per line, where the line
//! index is the label id.

use std::fs;
use std::path::Path;

use crate::core::parcellation::{BACKGROUND_ID, Labeling};
use crate::error::{Error, Result};
use crate::io::freesurfer::read_annotation;
use crate::io::has_extension;
use crate::io::table::read_labels;

#[derive(Debug, Clone, PartialEq)]
pub struct Atlas {
    pub names: Vec<String>,
    pub left: Labeling,
    pub right: Labeling,
}

pub fn parse_names(text: &str) -> Vec<String> {
    let mut names: Vec<String> = text.lines().map(|l| l.trim().to_string()).collect();
    while names.last().is_some_and(|n| n.is_empty()) {
        names.pop();
    }
    names
}

impl Atlas {
    pub fn new(names: Vec<String>, left: Labeling, right: Labeling) -> Result<Self> {
        for (hemi, labeling) in [("left", &left), ("right", &right)] {
            if let Some(&bad) = labeling.as_slice().iter().find(|&&id| id < BACKGROUND_ID) {
                return Err(Error::Atlas(format!("{hemi} labeling has negative id {bad}")));
            }
            if !names.is_empty() && labeling.max_id() as usize >= names.len() {
                return Err(Error::Atlas(format!(
                    "{hemi} labeling uses id {} but only {} names are defined",
                    labeling.max_id(),
                    names.len()
                )));
            }
        }
        Ok(Self { names, left, right })
    }

    /// Loads both labelings. An explicit names file overrides the
    /// annotation colortable.
    pub fn load(labels_lh: &Path, labels_rh: &Path, names: Option<&Path>) -> Result<Self> {
        let explicit = match names {
            Some(path) => Some(parse_names(
                &fs::read_to_string(path).map_err(|e| Error::io(path, e))?,
            )),
            None => None,
        };
        let annot = |p: &Path| has_extension(p, &["annot"]);
        if annot(labels_lh) && annot(labels_rh) {
            let (left, table) = read_annotation(labels_lh)?;
            let (right, _) = read_annotation(labels_rh)?;
            return Self::new(explicit.unwrap_or(table), left, right);
        }
        let names = explicit.ok_or_else(|| {
            Error::Config("atlas.names is required for text labelings".into())
        })?;
        Self::new(
            names,
            Labeling::new(read_labels(labels_lh)?),
            Labeling::new(read_labels(labels_rh)?),
        )
    }

    pub fn id_of(&self, name: &str) -> Option<i32> {
        self.names.iter().position(|n| n == name).map(|i| i as i32)
    }

    pub fn name_of(&self, id: i32) -> Option<&str> {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.names.get(i))
            .map(String::as_str)
    }

    /// Ids left out of aggregation: background, plus the medial wall when named.
    pub fn excluded_ids(&self, medial_wall: Option<&str>) -> Result<Vec<i32>> {
        let mut ids = vec![BACKGROUND_ID];
        if let Some(name) = medial_wall {
            let id = self
                .id_of(name)
                .ok_or_else(|| Error::Atlas(format!("no label named {name:?}")))?;
            if id != BACKGROUND_ID {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        ["Unknown", "G_front", "Medial_wall", "S_calc"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn medial_wall_is_resolved_by_name() {
        let atlas = Atlas::new(
            names(),
            Labeling::new(vec![0, 1, 2, 3]),
            Labeling::new(vec![3, 2, 1]),
        )
        .unwrap();
        assert_eq!(atlas.excluded_ids(Some("Medial_wall")).unwrap(), vec![0, 2]);
        assert_eq!(atlas.excluded_ids(None).unwrap(), vec![0]);
        assert!(matches!(atlas.excluded_ids(Some("Nope")), Err(Error::Atlas(_))));
        assert_eq!(atlas.name_of(3), Some("S_calc"));
    }

    #[test]
    fn ids_beyond_names_are_rejected() {
        let err = Atlas::new(names(), Labeling::new(vec![4]), Labeling::new(vec![0]));
        assert!(matches!(err, Err(Error::Atlas(_))));
    }

    #[test]
    fn text_labels_need_a_names_file() {
        let dir = std::env::temp_dir();
        let lh = dir.join(format!("gradprep_atlas_{}.lh.txt", std::process::id()));
        let rh = dir.join(format!("gradprep_atlas_{}.rh.txt", std::process::id()));
        let nm = dir.join(format!("gradprep_atlas_{}.names.txt", std::process::id()));
        fs::write(&lh, "0\n1\n2\n").unwrap();
        fs::write(&rh, "3\n1\n").unwrap();
        fs::write(&nm, "Unknown\nG_front\nMedial_wall\nS_calc\n").unwrap();

        assert!(matches!(Atlas::load(&lh, &rh, None), Err(Error::Config(_))));
        let atlas = Atlas::load(&lh, &rh, Some(&nm)).unwrap();
        assert_eq!(atlas.names, names());
        assert_eq!(atlas.right.len(), 2);

        for p in [lh, rh, nm] {
            let _ = fs::remove_file(p);
        }
    }

    #[test]
    fn trailing_blank_name_lines_are_dropped() {
        assert_eq!(parse_names("a\n\nb\n\n\n"), vec!["a", "", "b"]);
    }
}
