use std::{collections::HashMap, fs, path::Path};

use log::info;

use crate::{
    DartsErr, Result,
    genotype::{Edge, Genotype, Op},
};

use Op::{
    AvgPool3x3, Conv7x1And1x7, DilConv3x3, DilConv5x5, MaxPool3x3, SepConv3x3, SepConv5x5,
    SepConv7x7, SkipConnect,
};

/// The read-only mapping from architecture key to genotype.
///
/// It is built once at startup, either from the built-in genotypes alone or extended with the
/// entries of a JSON file, and then passed by reference to whoever needs to resolve keys.
#[derive(Debug, Clone)]
pub struct GenotypeRegistry {
    genotypes: HashMap<String, Genotype>,
}

impl GenotypeRegistry {
    /// Creates a registry holding only the published genotypes.
    ///
    /// # Returns
    /// A registry with `NASNet`, `AmoebaNet`, `DARTS_V1`, `DARTS_V2`, `DARTS` and `PDARTS`.
    pub fn builtin() -> Self {
        let darts_v2 = darts_v2();
        let genotypes = HashMap::from([
            ("NASNet".to_string(), nasnet()),
            ("AmoebaNet".to_string(), amoebanet()),
            ("DARTS_V1".to_string(), darts_v1()),
            ("DARTS".to_string(), darts_v2.clone()),
            ("DARTS_V2".to_string(), darts_v2),
            ("PDARTS".to_string(), pdarts()),
        ]);

        Self { genotypes }
    }

    /// Creates a registry from the built-in genotypes plus every entry of a JSON object file
    /// mapping keys to genotypes. File entries replace built-ins with the same key.
    ///
    /// # Arguments
    /// * `path` - The JSON file with extra genotypes.
    ///
    /// # Errors
    /// Returns an error if the file can't be read or any genotype in it is invalid.
    pub fn builtin_with_file(path: &Path) -> Result<Self> {
        let mut registry = Self::builtin();
        let raw = fs::read_to_string(path).map_err(|source| DartsErr::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let extra: HashMap<String, Genotype> = serde_json::from_str(&raw)?;

        info!("loaded {} extra genotype(s) from {}", extra.len(), path.display());
        registry.genotypes.extend(extra);
        Ok(registry)
    }

    /// Looks a genotype up by its architecture key.
    pub fn get(&self, key: &str) -> Option<&Genotype> {
        self.genotypes.get(key)
    }

    pub fn len(&self) -> usize {
        self.genotypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genotypes.is_empty()
    }

    /// Returns the registered keys in alphabetical order.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<_> = self.genotypes.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

impl Default for GenotypeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin(
    normal: Vec<Edge>,
    normal_concat: Vec<usize>,
    reduce: Vec<Edge>,
    reduce_concat: Vec<usize>,
) -> Genotype {
    Genotype::new_unchecked(normal, normal_concat, reduce, reduce_concat)
}

fn nasnet() -> Genotype {
    builtin(
        vec![
            (SepConv5x5, 1),
            (SepConv3x3, 0),
            (SepConv5x5, 0),
            (SepConv3x3, 0),
            (AvgPool3x3, 1),
            (SkipConnect, 0),
            (AvgPool3x3, 0),
            (AvgPool3x3, 0),
            (SepConv3x3, 1),
            (SkipConnect, 1),
        ],
        vec![2, 3, 4, 5, 6],
        vec![
            (SepConv5x5, 1),
            (SepConv7x7, 0),
            (MaxPool3x3, 1),
            (SepConv7x7, 0),
            (AvgPool3x3, 1),
            (SepConv5x5, 0),
            (SkipConnect, 3),
            (AvgPool3x3, 2),
            (SepConv3x3, 2),
            (MaxPool3x3, 1),
        ],
        vec![4, 5, 6],
    )
}

fn amoebanet() -> Genotype {
    builtin(
        vec![
            (AvgPool3x3, 0),
            (MaxPool3x3, 1),
            (SepConv3x3, 0),
            (SepConv5x5, 2),
            (SepConv3x3, 0),
            (AvgPool3x3, 3),
            (SepConv3x3, 1),
            (SkipConnect, 1),
            (SkipConnect, 0),
            (AvgPool3x3, 1),
        ],
        vec![4, 5, 6],
        vec![
            (AvgPool3x3, 0),
            (SepConv3x3, 1),
            (MaxPool3x3, 0),
            (SepConv7x7, 2),
            (SepConv7x7, 0),
            (AvgPool3x3, 1),
            (MaxPool3x3, 0),
            (MaxPool3x3, 1),
            (Conv7x1And1x7, 0),
            (SepConv3x3, 5),
        ],
        vec![3, 4, 6],
    )
}

fn darts_v1() -> Genotype {
    builtin(
        vec![
            (SepConv3x3, 1),
            (SepConv3x3, 0),
            (SkipConnect, 0),
            (SepConv3x3, 1),
            (SkipConnect, 0),
            (SepConv3x3, 1),
            (SepConv3x3, 0),
            (SkipConnect, 2),
        ],
        vec![2, 3, 4, 5],
        vec![
            (MaxPool3x3, 0),
            (MaxPool3x3, 1),
            (SkipConnect, 2),
            (MaxPool3x3, 0),
            (MaxPool3x3, 0),
            (SkipConnect, 2),
            (SkipConnect, 2),
            (AvgPool3x3, 0),
        ],
        vec![2, 3, 4, 5],
    )
}

fn darts_v2() -> Genotype {
    builtin(
        vec![
            (SepConv3x3, 0),
            (SepConv3x3, 1),
            (SepConv3x3, 0),
            (SepConv3x3, 1),
            (SepConv3x3, 1),
            (SkipConnect, 0),
            (SkipConnect, 0),
            (DilConv3x3, 2),
        ],
        vec![2, 3, 4, 5],
        vec![
            (MaxPool3x3, 0),
            (MaxPool3x3, 1),
            (SkipConnect, 2),
            (MaxPool3x3, 1),
            (MaxPool3x3, 0),
            (SkipConnect, 2),
            (SkipConnect, 2),
            (MaxPool3x3, 1),
        ],
        vec![2, 3, 4, 5],
    )
}

fn pdarts() -> Genotype {
    builtin(
        vec![
            (SkipConnect, 0),
            (DilConv3x3, 1),
            (SkipConnect, 0),
            (SepConv3x3, 1),
            (SepConv3x3, 1),
            (SepConv3x3, 3),
            (SepConv3x3, 0),
            (DilConv5x5, 4),
        ],
        vec![2, 3, 4, 5],
        vec![
            (AvgPool3x3, 0),
            (SepConv5x5, 1),
            (SepConv3x3, 0),
            (DilConv5x5, 2),
            (MaxPool3x3, 0),
            (DilConv3x3, 1),
            (DilConv3x3, 1),
            (DilConv5x5, 3),
        ],
        vec![2, 3, 4, 5],
    )
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn builtin_keys_resolve() {
        let registry = GenotypeRegistry::builtin();
        assert_eq!(
            registry.keys(),
            ["AmoebaNet", "DARTS", "DARTS_V1", "DARTS_V2", "NASNet", "PDARTS"]
        );
        assert_eq!(registry.get("DARTS"), registry.get("DARTS_V2"));
        assert!(registry.get("darts").is_none());
    }

    #[test]
    fn builtin_genotypes_are_valid() {
        let registry = GenotypeRegistry::builtin();
        for key in registry.keys() {
            registry.get(key).unwrap().validate().unwrap();
        }
    }

    #[test]
    fn extra_file_extends_and_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "TINY": {{
                    "normal": [["skip_connect", 0], ["sep_conv_3x3", 1]],
                    "normal_concat": [2],
                    "reduce": [["max_pool_3x3", 0], ["max_pool_3x3", 1]],
                    "reduce_concat": [2]
                }}
            }}"#
        )
        .unwrap();

        let registry = GenotypeRegistry::builtin_with_file(file.path()).unwrap();
        assert_eq!(registry.len(), 7);
        assert_eq!(registry.get("TINY").unwrap().reduce()[0], (Op::MaxPool3x3, 0));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = GenotypeRegistry::builtin_with_file(Path::new("/nonexistent/genotypes.json"))
            .unwrap_err();
        assert!(matches!(err, DartsErr::Io { .. }));
    }
}
