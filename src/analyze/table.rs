//! Truth tables.

use std::fmt;

/// A named pin variable of one or more bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Var {
    pub name: String,
    pub width: usize,
}

impl Var {
    pub fn new(name: impl Into<String>, width: usize) -> Self {
        Self {
            name: name.into(),
            width,
        }
    }

    /// Per-bit column names, most significant first: `d[3] .. d[0]`.
    pub fn bit_names(&self) -> Vec<String> {
        if self.width <= 1 {
            return vec![self.name.clone()];
        }
        (0..self.width)
            .rev()
            .map(|b| format!("{}[{}]", self.name, b))
            .collect()
    }
}

/// One output cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entry {
    Zero,
    One,
    DontCare,
    BusError,
    OscillateError,
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Zero => "0",
            Self::One => "1",
            Self::DontCare => "-",
            Self::BusError => "E",
            Self::OscillateError => "#",
        };
        f.write_str(s)
    }
}

/// Whether input column `column` is set in row `row`. Column 0 is the most
/// significant bit of the row number.
pub fn is_input_set(row: usize, column: usize, input_count: usize) -> bool {
    (row >> (input_count - 1 - column)) & 1 == 1
}

/// A complete truth table: one row per input combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruthTable {
    inputs: Vec<Var>,
    outputs: Vec<Var>,
    rows: Vec<Vec<Entry>>,
}

impl TruthTable {
    pub(crate) fn new(inputs: Vec<Var>, outputs: Vec<Var>, rows: Vec<Vec<Entry>>) -> Self {
        Self { inputs, outputs, rows }
    }

    pub fn inputs(&self) -> &[Var] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Var] {
        &self.outputs
    }

    pub fn input_names(&self) -> Vec<String> {
        self.inputs.iter().flat_map(Var::bit_names).collect()
    }

    pub fn output_names(&self) -> Vec<String> {
        self.outputs.iter().flat_map(Var::bit_names).collect()
    }

    pub fn input_bit_count(&self) -> usize {
        self.inputs.iter().map(|v| v.width).sum()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, row: usize) -> &[Entry] {
        &self.rows[row]
    }

    /// Input bits of a row, in column order.
    pub fn input_bits(&self, row: usize) -> Vec<bool> {
        let n = self.input_bit_count();
        (0..n).map(|c| is_input_set(row, c, n)).collect()
    }

    pub fn output(&self, row: usize, column: usize) -> Entry {
        self.rows[row][column]
    }

    /// One output column, top to bottom.
    pub fn column(&self, column: usize) -> Vec<Entry> {
        self.rows.iter().map(|r| r[column]).collect()
    }
}

impl fmt::Display for TruthTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inputs = self.input_names();
        let outputs = self.output_names();
        let header = |names: &[String]| names.join(" ");
        writeln!(f, "{} | {}", header(&inputs), header(&outputs))?;

        let in_widths: Vec<usize> = inputs.iter().map(String::len).collect();
        let out_widths: Vec<usize> = outputs.iter().map(String::len).collect();
        for row in 0..self.row_count() {
            let ins: Vec<String> = self
                .input_bits(row)
                .iter()
                .zip(&in_widths)
                .map(|(&b, &w)| format!("{:<w$}", u8::from(b), w = w))
                .collect();
            let outs: Vec<String> = self.rows[row]
                .iter()
                .zip(&out_widths)
                .map(|(e, &w)| format!("{:<w$}", e.to_string(), w = w))
                .collect();
            writeln!(f, "{} | {}", ins.join(" ").trim_end(), outs.join(" ").trim_end())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_names_msb_first() {
        assert_eq!(Var::new("a", 1).bit_names(), vec!["a"]);
        assert_eq!(Var::new("d", 3).bit_names(), vec!["d[2]", "d[1]", "d[0]"]);
    }

    #[test]
    fn test_input_columns() {
        assert!(!is_input_set(0b10, 1, 2));
        assert!(is_input_set(0b10, 0, 2));
        assert!(is_input_set(0b001, 2, 3));
    }

    #[test]
    fn test_display() {
        let table = TruthTable::new(
            vec![Var::new("a", 1)],
            vec![Var::new("y", 1)],
            vec![vec![Entry::One], vec![Entry::OscillateError]],
        );
        assert_eq!(table.to_string(), "a | y\n0 | 1\n1 | #\n");
        assert_eq!(table.column(0), vec![Entry::One, Entry::OscillateError]);
        assert_eq!(table.input_bits(1), vec![true]);
    }
}
