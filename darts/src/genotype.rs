use std::{
    fmt::{self, Display},
    str::FromStr,
};

use serde::Deserialize;

use crate::{DartsErr, Result};

/// A candidate operation on a cell edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum Op {
    None,
    MaxPool3x3,
    AvgPool3x3,
    SkipConnect,
    SepConv3x3,
    SepConv5x5,
    SepConv7x7,
    DilConv3x3,
    DilConv5x5,
    Conv7x1And1x7,
}

impl Op {
    /// Every operation known to the search space.
    pub const ALL: [Op; 10] = [
        Op::None,
        Op::MaxPool3x3,
        Op::AvgPool3x3,
        Op::SkipConnect,
        Op::SepConv3x3,
        Op::SepConv5x5,
        Op::SepConv7x7,
        Op::DilConv3x3,
        Op::DilConv5x5,
        Op::Conv7x1And1x7,
    ];

    /// Returns the name this operation has in checkpoints and search logs.
    pub fn name(&self) -> &'static str {
        match self {
            Op::None => "none",
            Op::MaxPool3x3 => "max_pool_3x3",
            Op::AvgPool3x3 => "avg_pool_3x3",
            Op::SkipConnect => "skip_connect",
            Op::SepConv3x3 => "sep_conv_3x3",
            Op::SepConv5x5 => "sep_conv_5x5",
            Op::SepConv7x7 => "sep_conv_7x7",
            Op::DilConv3x3 => "dil_conv_3x3",
            Op::DilConv5x5 => "dil_conv_5x5",
            Op::Conv7x1And1x7 => "conv_7x1_1x7",
        }
    }
}

impl FromStr for Op {
    type Err = DartsErr;

    fn from_str(s: &str) -> Result<Self> {
        Op::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| DartsErr::UnknownOp(s.to_string()))
    }
}

impl TryFrom<String> for Op {
    type Error = DartsErr;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An edge of a cell: the operation and the index of the state it reads from.
pub type Edge = (Op, usize);

#[derive(Deserialize)]
struct RawGenotype {
    normal: Vec<Edge>,
    normal_concat: Vec<usize>,
    reduce: Vec<Edge>,
    reduce_concat: Vec<usize>,
}

/// The architecture descriptor of a DARTS network: which operations each normal and reduction
/// cell applies and which intermediate states get concatenated into the cell output.
///
/// Edges come in pairs, one pair per intermediate node. States `0` and `1` are the cell inputs,
/// state `2 + i` is the output of node `i`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawGenotype")]
pub struct Genotype {
    normal: Vec<Edge>,
    normal_concat: Vec<usize>,
    reduce: Vec<Edge>,
    reduce_concat: Vec<usize>,
}

impl Genotype {
    /// Creates a new `Genotype`, validating the topology of both cell kinds.
    ///
    /// # Arguments
    /// * `normal` - The edges of the normal cell.
    /// * `normal_concat` - The states concatenated into the normal cell output.
    /// * `reduce` - The edges of the reduction cell.
    /// * `reduce_concat` - The states concatenated into the reduction cell output.
    ///
    /// # Errors
    /// Returns `DartsErr::InvalidGenotype` if any edge or concat index is out of range.
    pub fn new(
        normal: Vec<Edge>,
        normal_concat: Vec<usize>,
        reduce: Vec<Edge>,
        reduce_concat: Vec<usize>,
    ) -> Result<Self> {
        let genotype = Self::new_unchecked(normal, normal_concat, reduce, reduce_concat);
        genotype.validate()?;
        Ok(genotype)
    }

    pub(crate) fn new_unchecked(
        normal: Vec<Edge>,
        normal_concat: Vec<usize>,
        reduce: Vec<Edge>,
        reduce_concat: Vec<usize>,
    ) -> Self {
        Self {
            normal,
            normal_concat,
            reduce,
            reduce_concat,
        }
    }

    /// Checks the topology of both cells.
    ///
    /// # Errors
    /// Returns `DartsErr::InvalidGenotype` describing the first violation found.
    pub fn validate(&self) -> Result<()> {
        validate_cell("normal", &self.normal, &self.normal_concat)?;
        validate_cell("reduce", &self.reduce, &self.reduce_concat)
    }

    pub fn normal(&self) -> &[Edge] {
        &self.normal
    }

    pub fn normal_concat(&self) -> &[usize] {
        &self.normal_concat
    }

    pub fn reduce(&self) -> &[Edge] {
        &self.reduce
    }

    pub fn reduce_concat(&self) -> &[usize] {
        &self.reduce_concat
    }

    /// Returns the edges and concat list of the requested cell kind.
    pub fn cell(&self, reduction: bool) -> (&[Edge], &[usize]) {
        if reduction {
            (&self.reduce, &self.reduce_concat)
        } else {
            (&self.normal, &self.normal_concat)
        }
    }
}

impl TryFrom<RawGenotype> for Genotype {
    type Error = DartsErr;

    fn try_from(raw: RawGenotype) -> Result<Self> {
        Genotype::new(raw.normal, raw.normal_concat, raw.reduce, raw.reduce_concat)
    }
}

fn validate_cell(kind: &str, edges: &[Edge], concat: &[usize]) -> Result<()> {
    if edges.is_empty() || edges.len() % 2 != 0 {
        return Err(DartsErr::InvalidGenotype(format!(
            "{kind} cell needs a non-empty, even number of edges, got {}",
            edges.len()
        )));
    }

    for (i, &(op, index)) in edges.iter().enumerate() {
        let available = 2 + i / 2;
        if index >= available {
            return Err(DartsErr::InvalidGenotype(format!(
                "{kind} edge {i} ({op}) reads state {index} but only {available} exist"
            )));
        }
    }

    let nstates = 2 + edges.len() / 2;
    if concat.is_empty() {
        return Err(DartsErr::InvalidGenotype(format!(
            "{kind} concat list is empty"
        )));
    }
    if let Some(&bad) = concat.iter().find(|&&i| i >= nstates) {
        return Err(DartsErr::InvalidGenotype(format!(
            "{kind} concat references state {bad} but only {nstates} exist"
        )));
    }

    Ok(())
}

fn fmt_edges(f: &mut fmt::Formatter<'_>, edges: &[Edge]) -> fmt::Result {
    f.write_str("[")?;
    for (i, (op, index)) in edges.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "('{op}', {index})")?;
    }
    f.write_str("]")
}

/// Formats the genotype the same way the search logs print it.
impl Display for Genotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Genotype(normal=")?;
        fmt_edges(f, &self.normal)?;
        write!(f, ", normal_concat={:?}, reduce=", self.normal_concat)?;
        fmt_edges(f, &self.reduce)?;
        write!(f, ", reduce_concat={:?})", self.reduce_concat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges(ops: &[(&str, usize)]) -> Vec<Edge> {
        ops.iter().map(|&(n, i)| (n.parse().unwrap(), i)).collect()
    }

    #[test]
    fn op_names_round_trip() {
        for op in Op::ALL {
            assert_eq!(op.name().parse::<Op>().unwrap(), op);
        }
        assert!(matches!("conv_3x3".parse::<Op>(), Err(DartsErr::UnknownOp(_))));
    }

    #[test]
    fn rejects_edges_reading_future_states() {
        let bad = edges(&[("sep_conv_3x3", 0), ("sep_conv_3x3", 2)]);
        let good = edges(&[("sep_conv_3x3", 0), ("skip_connect", 1)]);

        let err = Genotype::new(bad, vec![2], good.clone(), vec![2]).unwrap_err();
        assert!(matches!(err, DartsErr::InvalidGenotype(_)));

        assert!(Genotype::new(good.clone(), vec![2], good, vec![2]).is_ok());
    }

    #[test]
    fn rejects_odd_edges_and_bad_concat() {
        let odd = edges(&[("sep_conv_3x3", 0)]);
        let good = edges(&[("sep_conv_3x3", 0), ("skip_connect", 1)]);

        assert!(Genotype::new(odd, vec![2], good.clone(), vec![2]).is_err());
        assert!(Genotype::new(good.clone(), vec![3], good.clone(), vec![2]).is_err());
        assert!(Genotype::new(good.clone(), vec![], good, vec![2]).is_err());
    }

    #[test]
    fn deserializes_and_validates_json() {
        let json = r#"{
            "normal": [["sep_conv_3x3", 0], ["dil_conv_5x5", 1]],
            "normal_concat": [2],
            "reduce": [["max_pool_3x3", 0], ["skip_connect", 1]],
            "reduce_concat": [2]
        }"#;
        let genotype: Genotype = serde_json::from_str(json).unwrap();
        assert_eq!(genotype.normal()[1], (Op::DilConv5x5, 1));

        let invalid = json.replace("[\"skip_connect\", 1]", "[\"skip_connect\", 7]");
        assert!(serde_json::from_str::<Genotype>(&invalid).is_err());
    }

    #[test]
    fn display_matches_log_format() {
        let cell = edges(&[("sep_conv_3x3", 0), ("skip_connect", 1)]);
        let genotype = Genotype::new(cell.clone(), vec![2], cell, vec![2]).unwrap();
        assert_eq!(
            genotype.to_string(),
            "Genotype(normal=[('sep_conv_3x3', 0), ('skip_connect', 1)], normal_concat=[2], \
             reduce=[('sep_conv_3x3', 0), ('skip_connect', 1)], reduce_concat=[2])"
        );
    }
}
