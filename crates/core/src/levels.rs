//! Escalation levels: static reachability and the transition law.

use crate::ast::{Level, Program, SymKind};
use crate::error::{CompileError, ErrorBudget, TooManyErrors};

/// Mark every level some `trigger` names as reachable. Level 0 is the
/// initial state and always reachable. Runs on the folded program so
/// triggers in dropped rules do not count.
pub fn mark_reachable(program: &mut Program) {
    let mut targets = vec![0usize];
    for sect in &program.sections {
        for rule in &sect.rules {
            for action in &rule.actions {
                action.call.walk(&mut |s| {
                    if let SymKind::Call(c) = &s.kind {
                        if c.name == "trigger" {
                            if let Some(SymKind::Level(l)) = c.args.first().map(|a| &a.kind) {
                                targets.push(l.index);
                            }
                        }
                    }
                });
            }
        }
    }
    for level in &mut program.levels {
        level.reachable = targets.contains(&level.index);
    }
}

/// Report each level no trigger can reach.
pub fn check_reachable(program: &mut Program, budget: &mut ErrorBudget) -> Result<(), TooManyErrors> {
    mark_reachable(program);
    for level in program.levels.iter().filter(|l| !l.reachable) {
        let msg = format!("level {} not reachable", level.name);
        budget.record(CompileError::levels(&level.pos, msg))?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// First transition of a run; direction is not checked
    Initial,
    Stay,
    Escalate,
    /// One step down from a soft level
    Relax,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("level {to} out of range, {count} levels declared")]
    OutOfRange { to: usize, count: usize },
    #[error("cannot go down from {from} to {to}: {from} is not soft")]
    NotSoft { from: String, to: String },
    #[error("cannot go down from {from} to {to}: soft levels go down one step")]
    TooFar { from: String, to: String },
}

/// Decide whether the active level may move from `from` to `to`.
pub fn check_transition(
    levels: &[Level],
    from: usize,
    to: usize,
    first: bool,
) -> Result<Transition, TransitionError> {
    let count = levels.len();
    if to >= count || from >= count {
        return Err(TransitionError::OutOfRange {
            to: to.max(from),
            count,
        });
    }
    if first {
        return Ok(Transition::Initial);
    }
    if to == from {
        return Ok(Transition::Stay);
    }
    if to > from {
        return Ok(Transition::Escalate);
    }
    let (f, t) = (&levels[from], &levels[to]);
    if !f.soft {
        return Err(TransitionError::NotSoft {
            from: f.name.clone(),
            to: t.name.clone(),
        });
    }
    if to + 1 != from {
        return Err(TransitionError::TooFar {
            from: f.name.clone(),
            to: t.name.clone(),
        });
    }
    Ok(Transition::Relax)
}

/// Position of level `index` in `[0, 1]`.
pub fn gravity(index: usize, count: usize) -> f64 {
    if count <= 1 {
        return 0.0;
    }
    index as f64 / (count - 1) as f64
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Position;

    fn ladder(soft: &[bool]) -> Vec<Level> {
        soft.iter()
            .enumerate()
            .map(|(index, &soft)| Level {
                name: ["A", "B", "C", "D"][index].to_owned(),
                index,
                soft,
                reachable: true,
                pos: Position::new("levels.rul", 1),
            })
            .collect()
    }

    #[test]
    fn skip_ahead_is_always_allowed() {
        let levels = ladder(&[false, true, false]);
        assert_eq!(check_transition(&levels, 0, 2, false), Ok(Transition::Escalate));
    }

    #[test]
    fn stepping_down_needs_a_soft_origin() {
        let levels = ladder(&[false, true, false]);
        assert_eq!(check_transition(&levels, 1, 0, false), Ok(Transition::Relax));
        assert!(matches!(
            check_transition(&levels, 2, 1, false),
            Err(TransitionError::NotSoft { .. })
        ));
        let levels = ladder(&[false, true, true]);
        assert_eq!(check_transition(&levels, 2, 1, false), Ok(Transition::Relax));
        assert!(matches!(
            check_transition(&levels, 2, 0, false),
            Err(TransitionError::TooFar { .. })
        ));
    }

    #[test]
    fn round_trip_fails_at_the_last_step() {
        let levels = ladder(&[false, true, false]);
        let mut at = 0;
        for (to, ok) in [(1, true), (2, true), (0, false)] {
            let r = check_transition(&levels, at, to, false);
            assert_eq!(r.is_ok(), ok, "{} -> {}", at, to);
            if ok {
                at = to;
            }
        }
        assert_eq!(at, 2);
    }

    #[test]
    fn first_transition_and_bounds() {
        let levels = ladder(&[false, false, false]);
        assert_eq!(check_transition(&levels, 2, 0, true), Ok(Transition::Initial));
        assert_eq!(check_transition(&levels, 1, 1, false), Ok(Transition::Stay));
        assert_eq!(
            check_transition(&levels, 0, 3, false),
            Err(TransitionError::OutOfRange { to: 3, count: 3 })
        );
    }

    #[test]
    fn gravity_is_normalized() {
        assert_eq!(gravity(0, 1), 0.0);
        assert_eq!(gravity(2, 3), 1.0);
        assert_eq!(gravity(1, 3), 0.5);
    }
}
