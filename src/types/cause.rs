//! The cause algebra: why a fiber did not succeed.
//!
//! A [`Cause`] is a tree. Leaves are the three kinds of abnormal termination:
//!
//! - `Fail(E)`: an expected, typed failure
//! - `Die(Defect)`: a defect (panic or explicit die)
//! - `Interrupt(FiberId)`: the fiber was interrupted by the given fiber
//!
//! Inner nodes record how simultaneous terminations relate:
//!
//! - `Sequential(a, b)`: `b` happened while unwinding from `a` (a finalizer
//!   failing after the body failed, for example)
//! - `Parallel(a, b)`: `a` and `b` happened in concurrently running fibers,
//!   `a` completing first
//!
//! `Empty` is the identity of both combinators. Equality treats each
//! combinator as associative and ignores `Empty` operands, so
//! `(a ; b) ; c == a ; (b ; c)`, while operand order and the distinction
//! between `;` and `|` stay significant.

use super::id::FiberId;
use core::convert::Infallible;
use core::fmt;
use std::any::Any;

/// Payload of a defect.
///
/// Produced from caught panics and from explicit [`Cause::die`] calls. Only
/// the rendered message survives; the original panic value is not kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defect {
    message: String,
}

impl Defect {
    /// Defect with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Renders a `catch_unwind` payload.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panic with a non-string payload".to_string()
        };
        Self { message }
    }

    /// The defect message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Structured description of a fiber's abnormal termination.
#[derive(Debug, Clone)]
pub enum Cause<E> {
    /// Nothing went wrong. Identity of both combinators.
    Empty,
    /// Expected failure with a typed error.
    Fail(E),
    /// Defect.
    Die(Defect),
    /// Interrupted by the given fiber.
    Interrupt(FiberId),
    /// Right happened while unwinding from left.
    Sequential(Box<Cause<E>>, Box<Cause<E>>),
    /// Both happened concurrently, left completing first.
    Parallel(Box<Cause<E>>, Box<Cause<E>>),
}

impl<E> Cause<E> {
    /// The empty cause.
    #[must_use]
    pub const fn empty() -> Self {
        Self::Empty
    }

    /// Typed failure leaf.
    #[must_use]
    pub const fn fail(error: E) -> Self {
        Self::Fail(error)
    }

    /// Defect leaf.
    #[must_use]
    pub const fn die(defect: Defect) -> Self {
        Self::Die(defect)
    }

    /// Interruption leaf.
    #[must_use]
    pub const fn interrupt(by: FiberId) -> Self {
        Self::Interrupt(by)
    }

    /// `first ; then`, dropping `Empty` operands.
    #[must_use]
    pub fn sequential(first: Self, then: Self) -> Self {
        match (first, then) {
            (Self::Empty, other) | (other, Self::Empty) => other,
            (first, then) => Self::Sequential(Box::new(first), Box::new(then)),
        }
    }

    /// `first | second`, dropping `Empty` operands.
    #[must_use]
    pub fn parallel(first: Self, second: Self) -> Self {
        match (first, second) {
            (Self::Empty, other) | (other, Self::Empty) => other,
            (first, second) => Self::Parallel(Box::new(first), Box::new(second)),
        }
    }

    /// Catamorphism: one function per variant, applied bottom-up.
    pub fn fold<'a, Z, FE, FF, FD, FI, FS, FP>(
        &'a self,
        on_empty: &mut FE,
        on_fail: &mut FF,
        on_die: &mut FD,
        on_interrupt: &mut FI,
        on_sequential: &mut FS,
        on_parallel: &mut FP,
    ) -> Z
    where
        FE: FnMut() -> Z,
        FF: FnMut(&'a E) -> Z,
        FD: FnMut(&'a Defect) -> Z,
        FI: FnMut(FiberId) -> Z,
        FS: FnMut(Z, Z) -> Z,
        FP: FnMut(Z, Z) -> Z,
    {
        match self {
            Self::Empty => on_empty(),
            Self::Fail(e) => on_fail(e),
            Self::Die(d) => on_die(d),
            Self::Interrupt(id) => on_interrupt(*id),
            Self::Sequential(l, r) => {
                let l = l.fold(
                    on_empty,
                    on_fail,
                    on_die,
                    on_interrupt,
                    on_sequential,
                    on_parallel,
                );
                let r = r.fold(
                    on_empty,
                    on_fail,
                    on_die,
                    on_interrupt,
                    on_sequential,
                    on_parallel,
                );
                on_sequential(l, r)
            }
            Self::Parallel(l, r) => {
                let l = l.fold(
                    on_empty,
                    on_fail,
                    on_die,
                    on_interrupt,
                    on_sequential,
                    on_parallel,
                );
                let r = r.fold(
                    on_empty,
                    on_fail,
                    on_die,
                    on_interrupt,
                    on_sequential,
                    on_parallel,
                );
                on_parallel(l, r)
            }
        }
    }

    fn any_leaf(&self, mut leaf: impl FnMut(&Self) -> bool) -> bool {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                Self::Sequential(l, r) | Self::Parallel(l, r) => {
                    stack.push(r);
                    stack.push(l);
                }
                other if leaf(other) => return true,
                _ => {}
            }
        }
        false
    }

    /// True when the tree holds no Fail, Die or Interrupt leaf.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.any_leaf(|leaf| !matches!(leaf, Self::Empty))
    }

    /// True when any typed failure is present.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.any_leaf(|leaf| matches!(leaf, Self::Fail(_)))
    }

    /// True when any defect is present.
    #[must_use]
    pub fn is_die(&self) -> bool {
        self.any_leaf(|leaf| matches!(leaf, Self::Die(_)))
    }

    /// True when any interruption is present.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.any_leaf(|leaf| matches!(leaf, Self::Interrupt(_)))
    }

    /// True when the cause is non-empty and every leaf is an interruption.
    #[must_use]
    pub fn is_interrupted_only(&self) -> bool {
        self.fold(
            &mut || None,
            &mut |_: &E| Some(false),
            &mut |_: &Defect| Some(false),
            &mut |_| Some(true),
            &mut both_interrupt,
            &mut both_interrupt,
        )
        .unwrap_or(false)
    }

    /// Typed failures, depth-first, left to right.
    #[must_use]
    pub fn failures(&self) -> Vec<&E> {
        self.fold(
            &mut Vec::new,
            &mut |e| vec![e],
            &mut |_| Vec::new(),
            &mut |_| Vec::new(),
            &mut concat,
            &mut concat,
        )
    }

    /// Defects, depth-first, left to right.
    #[must_use]
    pub fn defects(&self) -> Vec<&Defect> {
        self.fold(
            &mut Vec::new,
            &mut |_| Vec::new(),
            &mut |d| vec![d],
            &mut |_| Vec::new(),
            &mut concat,
            &mut concat,
        )
    }

    /// Fibers that caused interruptions, in order of first appearance.
    #[must_use]
    pub fn interruptors(&self) -> Vec<FiberId> {
        let mut ids = self.fold(
            &mut Vec::new,
            &mut |_: &E| Vec::new(),
            &mut |_| Vec::new(),
            &mut |id| vec![id],
            &mut concat,
            &mut concat,
        );
        let mut seen = Vec::with_capacity(ids.len());
        ids.retain(|id| {
            if seen.contains(id) {
                false
            } else {
                seen.push(*id);
                true
            }
        });
        ids
    }

    /// First typed failure when the cause is made of typed failures only.
    ///
    /// Any Die or Interrupt leaf, or the absence of a Fail leaf, hands the
    /// cause back unchanged.
    pub fn failure_or_cause(self) -> Result<E, Self> {
        if self.is_die() || self.is_interrupted() || !self.is_failure() {
            return Err(self);
        }
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                Self::Fail(e) => return Ok(e),
                Self::Sequential(l, r) | Self::Parallel(l, r) => {
                    stack.push(*r);
                    stack.push(*l);
                }
                _ => {}
            }
        }
        Err(Self::Empty)
    }

    /// Transforms every typed failure.
    #[must_use]
    pub fn map<E2>(self, mut f: impl FnMut(E) -> E2) -> Cause<E2> {
        self.map_with(&mut f)
    }

    fn map_with<E2, F: FnMut(E) -> E2>(self, f: &mut F) -> Cause<E2> {
        match self {
            Self::Empty => Cause::Empty,
            Self::Fail(e) => Cause::Fail(f(e)),
            Self::Die(d) => Cause::Die(d),
            Self::Interrupt(id) => Cause::Interrupt(id),
            Self::Sequential(l, r) => {
                Cause::Sequential(Box::new(l.map_with(f)), Box::new(r.map_with(f)))
            }
            Self::Parallel(l, r) => {
                Cause::Parallel(Box::new(l.map_with(f)), Box::new(r.map_with(f)))
            }
        }
    }

    /// Drops the error type: typed failures become defects carrying their
    /// `Debug` rendering. Structure and every other leaf are kept.
    #[must_use]
    pub fn erase(&self) -> Cause<Infallible>
    where
        E: fmt::Debug,
    {
        self.fold(
            &mut || Cause::Empty,
            &mut |e| Cause::Die(Defect::new(format!("{e:?}"))),
            &mut |d| Cause::Die(d.clone()),
            &mut Cause::Interrupt,
            &mut Cause::sequential,
            &mut Cause::parallel,
        )
    }

    /// Merges concurrent and sequential typed failures into one list.
    ///
    /// A cause made only of `Fail` leaves (ignoring `Empty`) becomes a single
    /// `Fail` holding the payloads depth-first, left to right. A cause with
    /// any Die or Interrupt leaf is left as it is, each `Fail` wrapped in a
    /// one-element list, so no defect or interruption is ever folded away.
    /// Causes that compare equal collect to causes that compare equal.
    #[must_use]
    pub fn collect_failures(self) -> Cause<Vec<E>> {
        if self.is_die() || self.is_interrupted() {
            return self.map(|e| vec![e]);
        }
        let mut payloads = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                Self::Fail(e) => payloads.push(e),
                Self::Sequential(l, r) | Self::Parallel(l, r) => {
                    stack.push(*r);
                    stack.push(*l);
                }
                Self::Empty | Self::Die(_) | Self::Interrupt(_) => {}
            }
        }
        if payloads.is_empty() {
            Cause::Empty
        } else {
            Cause::Fail(payloads)
        }
    }

    /// Canonical form used by equality: nested same-kind nodes flattened,
    /// `Empty` removed. `None` means the cause is empty.
    fn shape(&self) -> Option<Shape<'_, E>> {
        match self {
            Self::Empty => None,
            Self::Fail(e) => Some(Shape::Fail(e)),
            Self::Die(d) => Some(Shape::Die(d)),
            Self::Interrupt(id) => Some(Shape::Interrupt(*id)),
            Self::Sequential(l, r) => {
                let mut parts = Vec::new();
                for side in [l, r] {
                    match side.shape() {
                        Some(Shape::Sequential(inner)) => parts.extend(inner),
                        Some(other) => parts.push(other),
                        None => {}
                    }
                }
                Shape::collapse(parts, Shape::Sequential)
            }
            Self::Parallel(l, r) => {
                let mut parts = Vec::new();
                for side in [l, r] {
                    match side.shape() {
                        Some(Shape::Parallel(inner)) => parts.extend(inner),
                        Some(other) => parts.push(other),
                        None => {}
                    }
                }
                Shape::collapse(parts, Shape::Parallel)
            }
        }
    }
}

impl Cause<Infallible> {
    /// Embeds an error-free cause into any error type.
    #[must_use]
    pub fn widen<E>(self) -> Cause<E> {
        self.map(|never| match never {})
    }
}

fn both_interrupt(l: Option<bool>, r: Option<bool>) -> Option<bool> {
    match (l, r) {
        (None, x) | (x, None) => x,
        (Some(a), Some(b)) => Some(a && b),
    }
}

fn concat<T>(mut l: Vec<T>, r: Vec<T>) -> Vec<T> {
    l.extend(r);
    l
}

#[derive(Debug, PartialEq)]
enum Shape<'a, E> {
    Fail(&'a E),
    Die(&'a Defect),
    Interrupt(FiberId),
    Sequential(Vec<Shape<'a, E>>),
    Parallel(Vec<Shape<'a, E>>),
}

impl<'a, E> Shape<'a, E> {
    fn collapse(mut parts: Vec<Self>, node: fn(Vec<Self>) -> Self) -> Option<Self> {
        match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(node(parts)),
        }
    }
}

impl<E: PartialEq> PartialEq for Cause<E> {
    fn eq(&self, other: &Self) -> bool {
        self.shape() == other.shape()
    }
}

impl<E: Eq> Eq for Cause<E> {}

impl<E: fmt::Debug> fmt::Display for Cause<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Fail(e) => write!(f, "Fail({e:?})"),
            Self::Die(d) => write!(f, "Die({d})"),
            Self::Interrupt(id) => write!(f, "Interrupt({id})"),
            Self::Sequential(l, r) => write!(f, "{l} ; {r}"),
            Self::Parallel(l, r) => write!(f, "({l} | {r})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fid(n: u32) -> FiberId {
        FiberId::new_for_test(n, u64::from(n))
    }

    fn die<E>(msg: &str) -> Cause<E> {
        Cause::die(Defect::new(msg))
    }

    #[test]
    fn smart_constructors_drop_empty() {
        let a: Cause<&str> = Cause::fail("a");
        assert!(matches!(
            Cause::sequential(Cause::Empty, a.clone()),
            Cause::Fail("a")
        ));
        assert!(matches!(
            Cause::parallel(a.clone(), Cause::Empty),
            Cause::Fail("a")
        ));
        assert!(Cause::<&str>::sequential(Cause::Empty, Cause::Empty).is_empty());
    }

    #[test]
    fn sequential_is_associative() {
        let (a, b, c) = (Cause::fail(1), Cause::fail(2), Cause::fail(3));
        let left = Cause::Sequential(
            Box::new(Cause::Sequential(Box::new(a.clone()), Box::new(b.clone()))),
            Box::new(c.clone()),
        );
        let right = Cause::Sequential(
            Box::new(a),
            Box::new(Cause::Sequential(Box::new(b), Box::new(c))),
        );
        assert_eq!(left, right);
    }

    #[test]
    fn order_and_kind_are_significant() {
        let (a, b) = (Cause::fail(1), Cause::fail(2));
        assert_ne!(
            Cause::sequential(a.clone(), b.clone()),
            Cause::sequential(b.clone(), a.clone())
        );
        assert_ne!(
            Cause::sequential(a.clone(), b.clone()),
            Cause::parallel(a, b)
        );
    }

    #[test]
    fn raw_empty_operands_are_ignored_by_equality() {
        let raw = Cause::Parallel(Box::new(Cause::Empty), Box::new(Cause::fail(1)));
        assert_eq!(raw, Cause::fail(1));
        assert!(Cause::<u8>::Sequential(Box::new(Cause::Empty), Box::new(Cause::Empty)).is_empty());
    }

    #[test]
    fn predicates() {
        let cause: Cause<&str> = Cause::sequential(Cause::interrupt(fid(1)), die("finalizer"));
        assert!(cause.is_interrupted());
        assert!(cause.is_die());
        assert!(!cause.is_failure());
        assert!(!cause.is_interrupted_only());
        assert!(!cause.is_empty());

        let only: Cause<u8> = Cause::parallel(Cause::interrupt(fid(1)), Cause::interrupt(fid(2)));
        assert!(only.is_interrupted_only());
        assert!(!Cause::<u8>::Empty.is_interrupted_only());
    }

    #[test]
    fn queries_walk_left_to_right() {
        let cause = Cause::parallel(
            Cause::sequential(Cause::fail("a"), die("x")),
            Cause::parallel(Cause::interrupt(fid(4)), Cause::fail("b")),
        );
        assert_eq!(cause.failures(), vec![&"a", &"b"]);
        assert_eq!(cause.defects(), vec![&Defect::new("x")]);
        assert_eq!(cause.interruptors(), vec![fid(4)]);
    }

    #[test]
    fn interruptors_are_deduplicated() {
        let cause: Cause<u8> = Cause::sequential(
            Cause::interrupt(fid(2)),
            Cause::parallel(Cause::interrupt(fid(1)), Cause::interrupt(fid(2))),
        );
        assert_eq!(cause.interruptors(), vec![fid(2), fid(1)]);
    }

    #[test]
    fn failure_or_cause_only_for_pure_failures() {
        let pure = Cause::sequential(Cause::fail("first"), Cause::fail("second"));
        assert_eq!(pure.failure_or_cause(), Ok("first"));

        let mixed = Cause::parallel(Cause::fail("e"), Cause::interrupt(fid(1)));
        assert!(mixed.failure_or_cause().is_err());
        assert!(Cause::<&str>::Empty.failure_or_cause().is_err());
    }

    #[test]
    fn fold_counts_leaves() {
        let cause = Cause::parallel(
            Cause::fail(1),
            Cause::sequential(Cause::die(Defect::new("d")), Cause::fail(2)),
        );
        let leaves = cause.fold(
            &mut || 0,
            &mut |_: &i32| 1,
            &mut |_: &Defect| 1,
            &mut |_| 1,
            &mut |a, b| a + b,
            &mut |a, b| a + b,
        );
        assert_eq!(leaves, 3);
    }

    #[test]
    fn erase_keeps_structure() {
        let cause = Cause::sequential(Cause::fail("boom"), Cause::interrupt(fid(3)));
        let erased = cause.erase();
        assert_eq!(
            erased,
            Cause::sequential(
                Cause::die(Defect::new("\"boom\"")),
                Cause::interrupt(fid(3))
            )
        );
        let widened: Cause<String> = erased.widen();
        assert!(widened.is_die());
        assert!(!widened.is_failure());
    }

    #[test]
    fn collect_failures_merges_pure_parallel() {
        let cause = Cause::parallel(Cause::fail("A"), Cause::fail("B"));
        assert_eq!(cause.collect_failures(), Cause::fail(vec!["A", "B"]));
    }

    #[test]
    fn collect_failures_merges_pure_sequential_depth_first() {
        let cause = Cause::sequential(
            Cause::parallel(Cause::fail(1), Cause::fail(2)),
            Cause::fail(3),
        );
        assert_eq!(cause.collect_failures(), Cause::fail(vec![1, 2, 3]));
    }

    #[test]
    fn collect_failures_keeps_die_and_structure() {
        let cause = Cause::parallel(Cause::fail("A"), die("B"));
        let collected = cause.collect_failures();
        assert_eq!(
            collected,
            Cause::parallel(Cause::fail(vec!["A"]), Cause::die(Defect::new("B")))
        );
        assert!(collected.is_die());
    }

    #[test]
    fn collect_failures_leaves_mixed_trees_alone() {
        let cause = Cause::sequential(
            Cause::parallel(Cause::fail(1), Cause::fail(2)),
            Cause::interrupt(fid(9)),
        );
        let collected = cause.collect_failures();
        assert_eq!(
            collected,
            Cause::sequential(
                Cause::parallel(Cause::fail(vec![1]), Cause::fail(vec![2])),
                Cause::interrupt(fid(9))
            )
        );
        assert_eq!(collected.interruptors(), vec![fid(9)]);
    }

    #[test]
    fn collect_failures_ignores_nesting_of_equal_causes() {
        let left = Cause::sequential(Cause::sequential(Cause::fail(1), Cause::fail(2)), die("d"));
        let right = Cause::sequential(Cause::fail(1), Cause::sequential(Cause::fail(2), die("d")));
        assert_eq!(left, right);
        assert_eq!(left.collect_failures(), right.collect_failures());
    }

    #[test]
    fn collect_failures_of_empty_is_empty() {
        let cause: Cause<u8> = Cause::parallel(Cause::empty(), Cause::empty());
        assert!(cause.collect_failures().is_empty());
    }

    #[test]
    fn display_renders_operators() {
        let cause = Cause::sequential(
            Cause::parallel(Cause::fail("a"), Cause::interrupt(fid(2))),
            die("late"),
        );
        assert_eq!(cause.to_string(), "(Fail(\"a\") | Interrupt(F2)) ; Die(late)");
    }

    #[test]
    fn defect_from_panic_payloads() {
        let static_str: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(Defect::from_panic(static_str.as_ref()).message(), "static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(Defect::from_panic(owned.as_ref()).message(), "owned");
        let other: Box<dyn Any + Send> = Box::new(42_u32);
        assert_eq!(
            Defect::from_panic(other.as_ref()).message(),
            "panic with a non-string payload"
        );
    }
}
