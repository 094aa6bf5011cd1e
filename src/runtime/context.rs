// File: src/runtime/context.rs
//
// The execution context: variable and array storage plus I/O.
// Compiled code only ever talks to the `ExecutionContext` trait; `Store`
// is the in-memory implementation bound to a reader and a writer.
//
// The context is moved from unit to unit along with control, so at most
// one live unit ever holds it and no locking is needed around it.

use ahash::AHashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};

use crate::ast::Variable;
use crate::errors::{ErrorCode, IckError};

/// Storage and I/O as seen by running code.
pub trait ExecutionContext: Send {
    /// Read a `.` or `:` variable. Never-written variables fail with E200.
    fn read(&self, var: Variable) -> Result<u32, IckError>;

    fn write(&mut self, var: Variable, value: u32) -> Result<(), IckError>;

    /// Read an array element; `index` is 1-based, one entry per dimension.
    fn read_element(&self, array: Variable, index: &[u32]) -> Result<u32, IckError>;

    fn write_element(&mut self, array: Variable, index: &[u32], value: u32)
        -> Result<(), IckError>;

    fn redimension(&mut self, array: Variable, dimensions: &[u32]) -> Result<(), IckError>;

    fn stash(&mut self, var: Variable) -> Result<(), IckError>;

    /// Restore the most recently stashed value; E436 when there is none.
    fn retrieve(&mut self, var: Variable) -> Result<(), IckError>;

    fn ignore(&mut self, var: Variable);

    fn remember(&mut self, var: Variable);

    /// Print a number.
    fn read_out(&mut self, value: u32) -> Result<(), IckError>;

    /// Print an array as Turing text.
    fn read_out_array(&mut self, array: Variable) -> Result<(), IckError>;

    /// Read into a scalar (one number per line) or an array (one byte per element).
    fn write_in(&mut self, var: Variable) -> Result<(), IckError>;

    /// True with probability `percent`/100.
    fn chance(&mut self, percent: u8) -> bool;

    /// Uniform value in `0..bound`.
    fn random(&mut self, bound: u32) -> u32;
}

/// The context handed from unit to unit.
pub type Ctx = Box<dyn ExecutionContext>;

#[derive(Debug, Clone, Default)]
struct Cell<V> {
    value: V,
    ignored: bool,
    history: Vec<V>,
}

#[derive(Debug, Clone, PartialEq)]
struct Array {
    dimensions: Vec<usize>,
    data: Vec<u32>,
}

impl Array {
    fn offset(&self, index: &[u32]) -> Option<usize> {
        if index.len() != self.dimensions.len() {
            return None;
        }
        let mut offset = 0usize;
        for (&i, &dim) in index.iter().zip(&self.dimensions) {
            let i = i as usize;
            if i == 0 || i > dim {
                return None;
            }
            offset = offset * dim + (i - 1);
        }
        Some(offset)
    }
}

fn hyperspace(var: Variable) -> IckError {
    IckError::runtime(ErrorCode::E241, format!("({})", var))
}

fn io_failure(err: io::Error) -> IckError {
    IckError::io(ErrorCode::E562, err.to_string())
}

/// In-memory variables bound to an input and an output stream
pub struct Store {
    scalars: AHashMap<Variable, Cell<u32>>,
    arrays: AHashMap<Variable, Cell<Option<Array>>>,
    input: Box<dyn BufRead + Send>,
    output: Box<dyn Write + Send>,
    last_in: u8,
    last_out: u8,
    rng: StdRng,
}

impl Store {
    pub fn new(input: impl BufRead + Send + 'static, output: impl Write + Send + 'static) -> Self {
        Store {
            scalars: AHashMap::new(),
            arrays: AHashMap::new(),
            input: Box::new(input),
            output: Box::new(output),
            last_in: 0,
            last_out: 0,
            rng: StdRng::from_entropy(),
        }
    }

    /// A store reading stdin and writing stdout
    pub fn stdio() -> Self {
        Self::new(io::BufReader::new(io::stdin()), io::stdout())
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    fn check_scalar(var: Variable) -> Result<(), IckError> {
        if var.kind.is_array() {
            Err(hyperspace(var))
        } else {
            Ok(())
        }
    }

    fn check_width(var: Variable, value: u32) -> Result<(), IckError> {
        if var.kind.is_short() && value > u16::MAX as u32 {
            Err(IckError::runtime(ErrorCode::E275, format!("({} <- #{})", var, value)))
        } else {
            Ok(())
        }
    }

    fn array(&self, array: Variable) -> Result<&Array, IckError> {
        self.arrays
            .get(&array)
            .and_then(|cell| cell.value.as_ref())
            .ok_or_else(|| hyperspace(array))
    }

    fn read_byte(&mut self) -> Result<u8, IckError> {
        let byte = {
            let buffer = self.input.fill_buf().map_err(io_failure)?;
            match buffer.first() {
                Some(&b) => b,
                None => return Err(IckError::io(ErrorCode::E562, "(END OF INPUT)")),
            }
        };
        self.input.consume(1);
        Ok(byte)
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(io::empty(), io::sink())
    }
}

impl ExecutionContext for Store {
    fn read(&self, var: Variable) -> Result<u32, IckError> {
        Self::check_scalar(var)?;
        self.scalars
            .get(&var)
            .map(|cell| cell.value)
            .ok_or_else(|| IckError::runtime(ErrorCode::E200, format!("({})", var)))
    }

    fn write(&mut self, var: Variable, value: u32) -> Result<(), IckError> {
        Self::check_scalar(var)?;
        let cell = self.scalars.entry(var).or_default();
        if cell.ignored {
            return Ok(());
        }
        Self::check_width(var, value)?;
        cell.value = value;
        Ok(())
    }

    fn read_element(&self, array: Variable, index: &[u32]) -> Result<u32, IckError> {
        let arr = self.array(array)?;
        arr.offset(index).map(|i| arr.data[i]).ok_or_else(|| hyperspace(array))
    }

    fn write_element(&mut self, array: Variable, index: &[u32], value: u32) -> Result<(), IckError> {
        let cell = self.arrays.get_mut(&array).ok_or_else(|| hyperspace(array))?;
        if cell.ignored {
            return Ok(());
        }
        let arr = cell.value.as_mut().ok_or_else(|| hyperspace(array))?;
        let offset = arr.offset(index).ok_or_else(|| hyperspace(array))?;
        Self::check_width(array, value)?;
        arr.data[offset] = value;
        Ok(())
    }

    fn redimension(&mut self, array: Variable, dimensions: &[u32]) -> Result<(), IckError> {
        if !array.kind.is_array() {
            return Err(hyperspace(array));
        }
        if dimensions.is_empty() || dimensions.contains(&0) {
            return Err(IckError::runtime(ErrorCode::E240, format!("({})", array)));
        }
        let size = dimensions
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d as usize))
            .ok_or_else(|| hyperspace(array))?;

        let cell = self.arrays.entry(array).or_default();
        if cell.ignored {
            return Ok(());
        }
        cell.value = Some(Array {
            dimensions: dimensions.iter().map(|&d| d as usize).collect(),
            data: vec![0; size],
        });
        Ok(())
    }

    fn stash(&mut self, var: Variable) -> Result<(), IckError> {
        if var.kind.is_array() {
            let cell = self.arrays.entry(var).or_default();
            let snapshot = cell.value.clone();
            cell.history.push(snapshot);
        } else {
            let cell = self.scalars.entry(var).or_default();
            let snapshot = cell.value;
            cell.history.push(snapshot);
        }
        Ok(())
    }

    fn retrieve(&mut self, var: Variable) -> Result<(), IckError> {
        let empty = || IckError::runtime(ErrorCode::E436, format!("({})", var));
        if var.kind.is_array() {
            let cell = self.arrays.get_mut(&var).ok_or_else(empty)?;
            let value = cell.history.pop().ok_or_else(empty)?;
            if !cell.ignored {
                cell.value = value;
            }
        } else {
            let cell = self.scalars.get_mut(&var).ok_or_else(empty)?;
            let value = cell.history.pop().ok_or_else(empty)?;
            if !cell.ignored {
                cell.value = value;
            }
        }
        Ok(())
    }

    fn ignore(&mut self, var: Variable) {
        if var.kind.is_array() {
            self.arrays.entry(var).or_default().ignored = true;
        } else {
            self.scalars.entry(var).or_default().ignored = true;
        }
    }

    fn remember(&mut self, var: Variable) {
        if var.kind.is_array() {
            if let Some(cell) = self.arrays.get_mut(&var) {
                cell.ignored = false;
            }
        } else if let Some(cell) = self.scalars.get_mut(&var) {
            cell.ignored = false;
        }
    }

    fn read_out(&mut self, value: u32) -> Result<(), IckError> {
        writeln!(self.output, "{}", value).map_err(io_failure)?;
        self.output.flush().map_err(io_failure)
    }

    fn read_out_array(&mut self, array: Variable) -> Result<(), IckError> {
        let data = self.array(array)?.data.clone();
        let mut bytes = Vec::with_capacity(data.len());
        for value in data {
            let c = self.last_out.wrapping_sub(value as u8);
            self.last_out = c;
            bytes.push(c.reverse_bits());
        }
        self.output.write_all(&bytes).map_err(io_failure)?;
        self.output.flush().map_err(io_failure)
    }

    fn write_in(&mut self, var: Variable) -> Result<(), IckError> {
        if var.kind.is_array() {
            let len = match self.array(var)?.dimensions.as_slice() {
                [len] => *len,
                _ => return Err(hyperspace(var)),
            };
            for i in 1..=len {
                let byte = self.read_byte()?;
                let value = byte.wrapping_sub(self.last_in);
                self.last_in = byte;
                self.write_element(var, &[i as u32], value as u32)?;
            }
            return Ok(());
        }

        let mut line = String::new();
        if self.input.read_line(&mut line).map_err(io_failure)? == 0 {
            return Err(IckError::io(ErrorCode::E562, "(END OF INPUT)"));
        }
        let text = line.trim();
        let value = text
            .parse::<u32>()
            .map_err(|_| IckError::runtime(ErrorCode::E579, format!("\"{}\" ???", text)))?;
        self.write(var, value)
    }

    fn chance(&mut self, percent: u8) -> bool {
        match percent {
            0 => false,
            p if p >= 100 => true,
            p => self.rng.gen_range(0..100u8) < p,
        }
    }

    fn random(&mut self, bound: u32) -> u32 {
        if bound == 0 {
            0
        } else {
            self.rng.gen_range(0..bound)
        }
    }
}

/// A cloneable in-memory writer, handy for capturing program output.
#[derive(Debug, Clone, Default)]
pub struct SharedOutput(Arc<Mutex<Vec<u8>>>);

impl SharedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
