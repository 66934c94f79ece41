//! Line-oriented text persistence for trained networks.
//!
//! The on-disk format is UTF-8 text, one logical record per line, fields
//! tab-separated. It is a compatibility surface for every consumer that
//! stores trained models, so the grammar is fixed:
//!
//! ```text
//! LearningRate<TAB>0.01
//! InputNumber<TAB>9
//! OutputNumber<TAB>5
//! MinibatchCount<TAB>1
//! Weights<TAB>2                    layer count
//! Layer<TAB>5                      neuron count, then one line per neuron:
//! 0<TAB>0<TAB>w0<TAB>..<TAB>wn     layer index, neuron index, weight row
//! ...
//! Biases<TAB>2                     identical structure; each bias is a
//! Layer<TAB>5                      1-element vector for format symmetry
//! 0<TAB>0<TAB>b
//! ...
//! ```
//!
//! Loading reconstructs the layer shapes purely from the counts encountered
//! and rebuilds the gradient accumulator as zeros. Float fields are written
//! with Rust's shortest-round-trip formatting, so a save/load cycle
//! reproduces every tensor element exactly.

use crate::core::{Layer, NetError, NetResult, Network, PendingUpdate};
use ndarray::{Array1, Array2};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

impl Network {
    /// Save the network to `path`, flushing any pending gradient update
    /// first so the file reflects a consistent parameter state.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be created or written.
    pub fn save(&mut self, path: &Path) -> NetResult<()> {
        self.force_update();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut out = BufWriter::new(File::create(path)?);

        writeln!(out, "LearningRate\t{}", self.learning_rate)?;
        writeln!(out, "InputNumber\t{}", self.input_width)?;
        writeln!(out, "OutputNumber\t{}", self.output_width)?;
        writeln!(out, "MinibatchCount\t{}", self.minibatch_size)?;

        writeln!(out, "Weights\t{}", self.layers.len())?;
        for (l, layer) in self.layers.iter().enumerate() {
            writeln!(out, "Layer\t{}", layer.neurons())?;
            for (n, row) in layer.weights.rows().into_iter().enumerate() {
                write!(out, "{l}\t{n}")?;
                for v in row.iter() {
                    write!(out, "\t{v}")?;
                }
                writeln!(out)?;
            }
        }

        writeln!(out, "Biases\t{}", self.layers.len())?;
        for (l, layer) in self.layers.iter().enumerate() {
            writeln!(out, "Layer\t{}", layer.neurons())?;
            for (n, b) in layer.bias.iter().enumerate() {
                writeln!(out, "{l}\t{n}\t{b}")?;
            }
        }

        out.flush()?;
        Ok(())
    }

    /// Load a network from a file previously written by [`Network::save`].
    ///
    /// Shapes come from the counts in the file; the hyperparameters come
    /// from the header. The loaded network runs sequentially (the parallel
    /// flag is an execution preference, not part of the model).
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read; `CorruptModel` for truncated or
    /// malformed lines, unrecognized record tags, or any mismatch between
    /// declared counts and the values present.
    pub fn load(path: &Path) -> NetResult<Network> {
        let text = std::fs::read_to_string(path)?;
        parse_model(&text)
    }
}

/// Parse the full model grammar from an in-memory string.
fn parse_model(text: &str) -> NetResult<Network> {
    let mut lines = Records::new(text);

    let learning_rate = lines.tagged("LearningRate")?.parse_f32("LearningRate")?;
    let input_width = lines.tagged("InputNumber")?.parse_usize("InputNumber")?;
    let output_width = lines.tagged("OutputNumber")?.parse_usize("OutputNumber")?;
    let minibatch_size = lines.tagged("MinibatchCount")?.parse_usize("MinibatchCount")?;

    if !(learning_rate > 0.0) {
        return Err(corrupt(format!("non-positive learning rate {learning_rate}")));
    }
    if input_width == 0 || output_width == 0 {
        return Err(corrupt("zero input or output width in header".to_string()));
    }
    if minibatch_size == 0 {
        return Err(corrupt("zero minibatch count in header".to_string()));
    }

    let weights = parse_weight_section(&mut lines, input_width)?;
    let biases = parse_bias_section(&mut lines, &weights)?;
    lines.expect_end()?;

    let last_neurons = weights.last().map_or(0, |w| w.nrows());
    if last_neurons != output_width {
        return Err(corrupt(format!(
            "last layer has {last_neurons} neurons, header declares output width {output_width}"
        )));
    }

    let layers: Vec<Layer> = weights
        .into_iter()
        .zip(biases)
        .map(|(weights, bias)| Layer { weights, bias })
        .collect();
    let pending = PendingUpdate::zeros(&layers);
    Ok(Network {
        layers,
        input_width,
        output_width,
        learning_rate,
        minibatch_size,
        parallel: false,
        pending,
    })
}

/// Parse the `Weights` section: layer count, then per layer a neuron count
/// and one weight row per neuron. Row widths are chained from the input
/// width through each layer's neuron count.
fn parse_weight_section(lines: &mut Records<'_>, input_width: usize) -> NetResult<Vec<Array2<f32>>> {
    let layer_count = lines.tagged("Weights")?.parse_usize("Weights")?;
    if layer_count == 0 {
        return Err(corrupt("weight section declares zero layers".to_string()));
    }

    let mut matrices = Vec::with_capacity(layer_count);
    let mut incoming = input_width;
    for l in 0..layer_count {
        let neurons = lines.tagged("Layer")?.parse_usize("Layer")?;
        if neurons == 0 {
            return Err(corrupt(format!("layer {l} declares zero neurons")));
        }
        let mut flat = Vec::with_capacity(neurons * incoming);
        for n in 0..neurons {
            let values = lines.neuron_row(l, n, incoming)?;
            flat.extend(values);
        }
        let matrix = Array2::from_shape_vec((neurons, incoming), flat)
            .map_err(|e| corrupt(format!("layer {l} weight shape: {e}")))?;
        matrices.push(matrix);
        incoming = neurons;
    }
    Ok(matrices)
}

/// Parse the `Biases` section; its layer and neuron counts must agree with
/// the weight section, and every row carries exactly one value.
fn parse_bias_section(
    lines: &mut Records<'_>,
    weights: &[Array2<f32>],
) -> NetResult<Vec<Array1<f32>>> {
    let layer_count = lines.tagged("Biases")?.parse_usize("Biases")?;
    if layer_count != weights.len() {
        return Err(corrupt(format!(
            "bias section declares {layer_count} layers, weight section had {}",
            weights.len()
        )));
    }

    let mut vectors = Vec::with_capacity(layer_count);
    for (l, matrix) in weights.iter().enumerate() {
        let neurons = lines.tagged("Layer")?.parse_usize("Layer")?;
        if neurons != matrix.nrows() {
            return Err(corrupt(format!(
                "bias layer {l} declares {neurons} neurons, weight layer has {}",
                matrix.nrows()
            )));
        }
        let mut bias = Vec::with_capacity(neurons);
        for n in 0..neurons {
            let values = lines.neuron_row(l, n, 1)?;
            bias.push(values[0]);
        }
        vectors.push(Array1::from(bias));
    }
    Ok(vectors)
}

fn corrupt(msg: String) -> NetError {
    NetError::CorruptModel(msg)
}

/// Line-by-line record reader tracking line numbers for diagnostics.
struct Records<'a> {
    iter: std::str::Lines<'a>,
    line_no: usize,
}

/// A tagged record's value field, carrying its line number for error
/// messages.
struct Field<'a> {
    value: &'a str,
    line_no: usize,
}

impl<'a> Field<'a> {
    fn parse_f32(&self, tag: &str) -> NetResult<f32> {
        self.value.parse().map_err(|_| {
            corrupt(format!(
                "line {}: `{tag}` value `{}` is not a number",
                self.line_no, self.value
            ))
        })
    }

    fn parse_usize(&self, tag: &str) -> NetResult<usize> {
        self.value.parse().map_err(|_| {
            corrupt(format!(
                "line {}: `{tag}` value `{}` is not a count",
                self.line_no, self.value
            ))
        })
    }
}

impl<'a> Records<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            iter: text.lines(),
            line_no: 0,
        }
    }

    fn next_line(&mut self) -> NetResult<&'a str> {
        match self.iter.next() {
            Some(line) => {
                self.line_no += 1;
                Ok(line)
            }
            None => Err(corrupt("unexpected end of file".to_string())),
        }
    }

    /// Read one `tag<TAB>value` record, rejecting any other tag.
    fn tagged(&mut self, tag: &str) -> NetResult<Field<'a>> {
        let line = self.next_line()?;
        let (found, value) = line.split_once('\t').ok_or_else(|| {
            corrupt(format!(
                "line {}: expected `{tag}` record, got `{line}`",
                self.line_no
            ))
        })?;
        if found != tag {
            return Err(corrupt(format!(
                "line {}: unrecognized record tag `{found}`, expected `{tag}`",
                self.line_no
            )));
        }
        Ok(Field {
            value,
            line_no: self.line_no,
        })
    }

    /// Read one per-neuron row: `layer<TAB>neuron<TAB>v0..`, validating the
    /// indices and the exact number of values.
    fn neuron_row(&mut self, layer: usize, neuron: usize, expected: usize) -> NetResult<Vec<f32>> {
        let line = self.next_line()?;
        let line_no = self.line_no;
        let mut fields = line.split('\t');

        let l: usize = fields
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| corrupt(format!("line {line_no}: missing layer index")))?;
        let n: usize = fields
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| corrupt(format!("line {line_no}: missing neuron index")))?;
        if l != layer || n != neuron {
            return Err(corrupt(format!(
                "line {line_no}: row indexed ({l}, {n}), expected ({layer}, {neuron})"
            )));
        }

        let mut values = Vec::with_capacity(expected);
        for field in fields {
            let v: f32 = field.parse().map_err(|_| {
                corrupt(format!("line {line_no}: value `{field}` is not a number"))
            })?;
            values.push(v);
        }
        if values.len() != expected {
            return Err(corrupt(format!(
                "line {line_no}: row holds {} values, expected {expected}",
                values.len()
            )));
        }
        Ok(values)
    }

    /// Ensure only blank lines remain.
    fn expect_end(&mut self) -> NetResult<()> {
        for line in self.iter.by_ref() {
            self.line_no += 1;
            if !line.trim().is_empty() {
                return Err(corrupt(format!(
                    "line {}: trailing data `{line}`",
                    self.line_no
                )));
            }
        }
        Ok(())
    }
}
