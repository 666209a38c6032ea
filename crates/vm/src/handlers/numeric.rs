//! Arithmetic, bitwise and comparison instructions.
//!
//! Every result that re-enters the stack as an Integer is checked against
//! the 32-byte two's-complement bound.

use crate::execution_engine::ExecutionEngine;
use crate::stack_item::{require_integer_bounds, StackItem};
use crate::{VmError, VmResult};
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use std::cmp::Ordering;

impl ExecutionEngine {
    fn push_checked_int(&mut self, value: BigInt) -> VmResult<()> {
        require_integer_bounds(&value)?;
        self.push(StackItem::Integer(value))
    }

    pub(super) fn op_unary(&mut self, f: fn(BigInt) -> BigInt) -> VmResult<()> {
        let value = self.pop_int()?;
        self.push_checked_int(f(value))
    }

    pub(super) fn op_binary(&mut self, f: fn(BigInt, BigInt) -> BigInt) -> VmResult<()> {
        let b = self.pop_int()?;
        let a = self.pop_int()?;
        self.push_checked_int(f(a, b))
    }

    pub(super) fn op_sign(&mut self) -> VmResult<()> {
        let value = self.pop_int()?;
        let sign: i64 = match value.sign() {
            num_bigint::Sign::Minus => -1,
            num_bigint::Sign::NoSign => 0,
            num_bigint::Sign::Plus => 1,
        };
        self.push(StackItem::from_int(sign))
    }

    pub(super) fn op_div(&mut self) -> VmResult<()> {
        let b = self.pop_int()?;
        let a = self.pop_int()?;
        if b.is_zero() {
            return Err(VmError::throw("division by zero"));
        }
        self.push_checked_int(a / b)
    }

    pub(super) fn op_mod(&mut self) -> VmResult<()> {
        let b = self.pop_int()?;
        let a = self.pop_int()?;
        if b.is_zero() {
            return Err(VmError::throw("modulo by zero"));
        }
        self.push_checked_int(a % b)
    }

    pub(super) fn op_pow(&mut self) -> VmResult<()> {
        let exponent = self.pop_int()?;
        let base = self.pop_int()?;
        // The exponent shares the shift bound; anything larger would grow
        // the intermediate value far past the 32-byte cap before the result
        // check could reject it.
        let exponent = exponent
            .to_u32()
            .filter(|e| *e <= self.limits().max_shift)
            .ok_or_else(|| VmError::throw("invalid exponent"))?;
        self.push_checked_int(base.pow(exponent))
    }

    pub(super) fn op_sqrt(&mut self) -> VmResult<()> {
        let value = self.pop_int()?;
        if value.is_negative() {
            return Err(VmError::throw("square root of negative number"));
        }
        self.push_checked_int(value.sqrt())
    }

    pub(super) fn op_mod_mul(&mut self) -> VmResult<()> {
        let modulus = self.pop_int()?;
        let b = self.pop_int()?;
        let a = self.pop_int()?;
        if modulus.is_zero() {
            return Err(VmError::throw("modulo by zero"));
        }
        self.push_checked_int((a * b) % modulus)
    }

    pub(super) fn op_mod_pow(&mut self) -> VmResult<()> {
        let modulus = self.pop_int()?;
        let exponent = self.pop_int()?;
        let base = self.pop_int()?;
        if modulus.is_zero() {
            return Err(VmError::throw("modulo by zero"));
        }
        let result = if exponent == BigInt::from(-1) {
            mod_inverse(&base, &modulus)
                .ok_or_else(|| VmError::throw("no modular inverse exists"))?
        } else {
            if exponent.is_negative() {
                return Err(VmError::throw("negative exponent"));
            }
            base.modpow(&exponent, &modulus)
        };
        self.push_checked_int(result)
    }

    pub(super) fn op_shift(&mut self, left: bool) -> VmResult<()> {
        let shift = self.pop_int()?;
        let shift = shift
            .to_u32()
            .filter(|s| *s <= self.limits().max_shift)
            .ok_or_else(|| VmError::throw("invalid shift amount"))?;
        let value = self.pop_int()?;
        if shift == 0 {
            return self.push(StackItem::Integer(value));
        }
        let result = if left {
            value << shift
        } else {
            value >> shift
        };
        self.push_checked_int(result)
    }

    pub(super) fn op_invert(&mut self) -> VmResult<()> {
        let value = self.pop_int()?;
        self.push_checked_int(!value)
    }

    pub(super) fn op_bitwise(&mut self, f: fn(BigInt, BigInt) -> BigInt) -> VmResult<()> {
        let b = self.pop_int()?;
        let a = self.pop_int()?;
        self.push_checked_int(f(a, b))
    }

    pub(super) fn op_not(&mut self) -> VmResult<()> {
        let value = self.pop_bool()?;
        self.push(StackItem::Boolean(!value))
    }

    pub(super) fn op_bool_binary(&mut self, f: fn(bool, bool) -> bool) -> VmResult<()> {
        let b = self.pop_bool()?;
        let a = self.pop_bool()?;
        self.push(StackItem::Boolean(f(a, b)))
    }

    pub(super) fn op_nz(&mut self) -> VmResult<()> {
        let value = self.pop_int()?;
        self.push(StackItem::Boolean(!value.is_zero()))
    }

    pub(super) fn op_num_equal(&mut self, when: bool) -> VmResult<()> {
        let b = self.pop_int()?;
        let a = self.pop_int()?;
        self.push(StackItem::Boolean((a == b) == when))
    }

    pub(super) fn op_compare(&mut self, pred: fn(Ordering) -> bool) -> VmResult<()> {
        let b = self.pop()?;
        let a = self.pop()?;
        // A null operand never satisfies an ordering comparison.
        if a.is_null() || b.is_null() {
            return self.push(StackItem::Boolean(false));
        }
        let ordering = a.as_int()?.cmp(&b.as_int()?);
        self.push(StackItem::Boolean(pred(ordering)))
    }

    pub(super) fn op_within(&mut self) -> VmResult<()> {
        let b = self.pop_int()?;
        let a = self.pop_int()?;
        let x = self.pop_int()?;
        self.push(StackItem::Boolean(a <= x && x < b))
    }

    pub(super) fn op_equal(&mut self, when: bool) -> VmResult<()> {
        let b = self.pop()?;
        let a = self.pop()?;
        self.push(StackItem::Boolean(a.equals(&b)? == when))
    }
}

/// Modular inverse via the extended Euclidean algorithm.
fn mod_inverse(value: &BigInt, modulus: &BigInt) -> Option<BigInt> {
    let modulus = modulus.abs();
    let mut old_r = ((value % &modulus) + &modulus) % &modulus;
    let mut r = modulus.clone();
    let (mut old_s, mut s) = (BigInt::from(1), BigInt::from(0));
    while !r.is_zero() {
        let quotient = &old_r / &r;
        let next_r = &old_r - &quotient * &r;
        old_r = std::mem::replace(&mut r, next_r);
        let next_s = &old_s - &quotient * &s;
        old_s = std::mem::replace(&mut s, next_s);
    }
    if old_r != BigInt::from(1) {
        return None;
    }
    Some(((old_s % &modulus) + &modulus) % &modulus)
}
