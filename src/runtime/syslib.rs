// File: src/runtime/syslib.rs
//
// The system library: the traditional arithmetic routines at (1000)-(1999),
// implemented natively. Arguments and results live in the usual
// variables (.1 .2 .3 .4, :1 :2 :3 :4). Routines ending in 9 report
// overflow in .4 / :4 (#1 fine, #2 overflowed) instead of failing.

use futures::future::{self, BoxFuture, FutureExt};
use std::sync::Arc;

use crate::ast::{Label, Variable};
use crate::errors::{ErrorCode, IckError};
use crate::runtime::context::{Ctx, ExecutionContext};
use crate::runtime::linkage::Component;
use crate::runtime::nexting::{Fault, NextingStack, Outcome};

pub const SYSLIB_NAME: &str = "syslib";

const ROUTINES: &[u16] = &[
    1000, 1009, 1010, 1020, 1030, 1039, 1040, 1050, 1500, 1509, 1510, 1520, 1530, 1540, 1549,
    1550, 1900,
];

const FINE: u32 = 1;
const OVERFLOWED: u32 = 2;

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLibrary;

impl SystemLibrary {
    pub fn new() -> Self {
        SystemLibrary
    }
}

fn spot(ctx: &dyn ExecutionContext, n: u16) -> Result<u32, IckError> {
    ctx.read(Variable::spot(n))
}

fn two_spot(ctx: &dyn ExecutionContext, n: u16) -> Result<u32, IckError> {
    ctx.read(Variable::two_spot(n))
}

fn overflow(routine: u16) -> IckError {
    IckError::runtime(ErrorCode::E1999, format!("IN ({})", routine))
}

/// A 16-bit result, or E1999 when it does not fit.
fn short(routine: u16, value: Option<u32>) -> Result<u32, IckError> {
    value.filter(|v| *v <= 0xFFFF).ok_or_else(|| overflow(routine))
}

/// Store a 16-bit result into .3 and the overflow flag into .4.
fn flagged_short(ctx: &mut dyn ExecutionContext, value: Option<u32>, wrapped: u32) -> Result<(), IckError> {
    match value.filter(|v| *v <= 0xFFFF) {
        Some(v) => {
            ctx.write(Variable::spot(3), v)?;
            ctx.write(Variable::spot(4), FINE)
        }
        None => {
            ctx.write(Variable::spot(3), wrapped & 0xFFFF)?;
            ctx.write(Variable::spot(4), OVERFLOWED)
        }
    }
}

fn flagged_wide(ctx: &mut dyn ExecutionContext, value: Option<u32>, wrapped: u32) -> Result<(), IckError> {
    let (result, flag) = match value {
        Some(v) => (v, FINE),
        None => (wrapped, OVERFLOWED),
    };
    ctx.write(Variable::two_spot(3), result)?;
    ctx.write(Variable::two_spot(4), flag)
}

/// Run one routine against the caller's variables.
pub fn call_routine(routine: u16, ctx: &mut dyn ExecutionContext) -> Result<(), IckError> {
    match routine {
        1000 => {
            let sum = spot(ctx, 1)? + spot(ctx, 2)?;
            let sum = short(routine, Some(sum))?;
            ctx.write(Variable::spot(3), sum)
        }
        1009 => {
            let sum = spot(ctx, 1)? + spot(ctx, 2)?;
            flagged_short(ctx, Some(sum), sum)
        }
        1010 => {
            let difference = (spot(ctx, 1)? as u16).wrapping_sub(spot(ctx, 2)? as u16);
            ctx.write(Variable::spot(3), difference as u32)
        }
        1020 => {
            let next = (spot(ctx, 1)? as u16).wrapping_add(1);
            ctx.write(Variable::spot(1), next as u32)
        }
        1030 => {
            let product = spot(ctx, 1)?.checked_mul(spot(ctx, 2)?);
            let product = short(routine, product)?;
            ctx.write(Variable::spot(3), product)
        }
        1039 => {
            let (a, b) = (spot(ctx, 1)?, spot(ctx, 2)?);
            flagged_short(ctx, a.checked_mul(b), a.wrapping_mul(b))
        }
        1040 => {
            let (a, b) = (spot(ctx, 1)?, spot(ctx, 2)?);
            ctx.write(Variable::spot(3), a.checked_div(b).unwrap_or(0))
        }
        1050 => {
            let (a, b) = (two_spot(ctx, 1)?, spot(ctx, 1)?);
            let quotient = short(routine, Some(a.checked_div(b).unwrap_or(0)))?;
            ctx.write(Variable::spot(2), quotient)
        }
        1500 => {
            let sum = two_spot(ctx, 1)?.checked_add(two_spot(ctx, 2)?).ok_or_else(|| overflow(routine))?;
            ctx.write(Variable::two_spot(3), sum)
        }
        1509 => {
            let (a, b) = (two_spot(ctx, 1)?, two_spot(ctx, 2)?);
            flagged_wide(ctx, a.checked_add(b), a.wrapping_add(b))
        }
        1510 => {
            let difference = two_spot(ctx, 1)?.wrapping_sub(two_spot(ctx, 2)?);
            ctx.write(Variable::two_spot(3), difference)
        }
        1520 => {
            let joined = (spot(ctx, 1)? << 16) | spot(ctx, 2)?;
            ctx.write(Variable::two_spot(1), joined)
        }
        1530 => {
            let product = spot(ctx, 1)? * spot(ctx, 2)?;
            ctx.write(Variable::two_spot(1), product)
        }
        1540 => {
            let product =
                two_spot(ctx, 1)?.checked_mul(two_spot(ctx, 2)?).ok_or_else(|| overflow(routine))?;
            ctx.write(Variable::two_spot(3), product)
        }
        1549 => {
            let (a, b) = (two_spot(ctx, 1)?, two_spot(ctx, 2)?);
            flagged_wide(ctx, a.checked_mul(b), a.wrapping_mul(b))
        }
        1550 => {
            let (a, b) = (two_spot(ctx, 1)?, two_spot(ctx, 2)?);
            ctx.write(Variable::two_spot(3), a.checked_div(b).unwrap_or(0))
        }
        1900 => {
            let value = ctx.random(0x10000);
            ctx.write(Variable::spot(1), value)
        }
        other => Err(IckError::runtime(ErrorCode::E129, format!("({})", other))),
    }
}

impl Component for SystemLibrary {
    fn name(&self) -> &str {
        SYSLIB_NAME
    }

    fn exports(&self) -> Vec<Label> {
        ROUTINES.iter().filter_map(|&n| Label::new(n as u32)).collect()
    }

    // Runs to completion without a frame of its own: it can only resume its caller.
    fn call(
        &self,
        label: Label,
        mut ctx: Ctx,
        _stack: Arc<NextingStack<Ctx>>,
    ) -> BoxFuture<'static, Result<Outcome<Ctx>, Fault<Ctx>>> {
        let result = match call_routine(label.value(), ctx.as_mut()) {
            Ok(()) => Ok(Outcome::Resumed(ctx)),
            Err(error) => Err(Fault::with_baton(error, ctx)),
        };
        future::ready(result).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::context::Store;

    fn store(values: &[(Variable, u32)]) -> Store {
        let mut store = Store::default();
        for &(var, value) in values {
            store.write(var, value).unwrap();
        }
        store
    }

    fn read(store: &Store, var: Variable) -> u32 {
        store.read(var).unwrap()
    }

    #[test]
    fn test_add_16() {
        let mut s = store(&[(Variable::spot(1), 40000), (Variable::spot(2), 30000)]);
        let err = call_routine(1000, &mut s).unwrap_err();
        assert_eq!(err.code, ErrorCode::E1999);

        call_routine(1009, &mut s).unwrap();
        assert_eq!(read(&s, Variable::spot(3)), 70000 - 0x10000);
        assert_eq!(read(&s, Variable::spot(4)), 2);

        let mut s = store(&[(Variable::spot(1), 2), (Variable::spot(2), 3)]);
        call_routine(1000, &mut s).unwrap();
        assert_eq!(read(&s, Variable::spot(3)), 5);
    }

    #[test]
    fn test_subtract_and_increment_wrap() {
        let mut s = store(&[(Variable::spot(1), 1), (Variable::spot(2), 2)]);
        call_routine(1010, &mut s).unwrap();
        assert_eq!(read(&s, Variable::spot(3)), 0xFFFF);

        let mut s = store(&[(Variable::spot(1), 0xFFFF)]);
        call_routine(1020, &mut s).unwrap();
        assert_eq!(read(&s, Variable::spot(1)), 0);
    }

    #[test]
    fn test_multiply_and_divide() {
        let mut s = store(&[(Variable::spot(1), 300), (Variable::spot(2), 300)]);
        assert_eq!(call_routine(1030, &mut s).unwrap_err().code, ErrorCode::E1999);
        call_routine(1530, &mut s).unwrap();
        assert_eq!(read(&s, Variable::two_spot(1)), 90000);

        let mut s = store(&[(Variable::spot(1), 7), (Variable::spot(2), 0)]);
        call_routine(1040, &mut s).unwrap();
        assert_eq!(read(&s, Variable::spot(3)), 0);

        let mut s = store(&[(Variable::two_spot(1), 90000), (Variable::spot(1), 3)]);
        call_routine(1050, &mut s).unwrap();
        assert_eq!(read(&s, Variable::spot(2)), 30000);
    }

    #[test]
    fn test_wide_arithmetic() {
        let mut s = store(&[(Variable::two_spot(1), u32::MAX), (Variable::two_spot(2), 2)]);
        assert_eq!(call_routine(1500, &mut s).unwrap_err().code, ErrorCode::E1999);
        call_routine(1509, &mut s).unwrap();
        assert_eq!(read(&s, Variable::two_spot(3)), 1);
        assert_eq!(read(&s, Variable::two_spot(4)), 2);
        call_routine(1510, &mut s).unwrap();
        assert_eq!(read(&s, Variable::two_spot(3)), u32::MAX - 2);

        let mut s = store(&[(Variable::spot(1), 1), (Variable::spot(2), 2)]);
        call_routine(1520, &mut s).unwrap();
        assert_eq!(read(&s, Variable::two_spot(1)), 0x0001_0002);
    }

    #[test]
    fn test_random_fits_in_a_spot() {
        let mut s = Store::default().with_seed(3);
        call_routine(1900, &mut s).unwrap();
        assert!(read(&s, Variable::spot(1)) <= 0xFFFF);
    }

    #[test]
    fn test_exports_every_routine() {
        let exports = SystemLibrary::new().exports();
        assert_eq!(exports.len(), ROUTINES.len());
        assert!(exports.contains(&Label::new(1000).unwrap()));
    }
}
