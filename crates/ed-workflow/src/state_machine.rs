//! 状态机
//!
//! 医嘱、发药申请和分诊三条流转规则共用同一张 `(状态, 事件) -> 状态` 转换表。

use ed_core::{DispenseStatus, EdError, OrderStatus, Result, TriageState};
use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::hash::Hash;

/// 医嘱事件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderEvent {
    Fulfil,
    MarkNotPerformed,
    Cancel,
}

impl OrderEvent {
    /// 护士/药房可以直接设置的目标状态
    pub fn toward(target: OrderStatus) -> Result<Self> {
        match target {
            OrderStatus::Fulfilled => Ok(OrderEvent::Fulfil),
            OrderStatus::NotPerformed => Ok(OrderEvent::MarkNotPerformed),
            other => Err(EdError::Validation(format!(
                "order outcome must be FULFILLED or NOT_PERFORMED, got {}",
                other
            ))),
        }
    }
}

/// 发药申请事件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispenseEvent {
    MarkReady,
    Deliver,
}

impl DispenseEvent {
    pub fn toward(target: DispenseStatus) -> Result<Self> {
        match target {
            DispenseStatus::Ready => Ok(DispenseEvent::MarkReady),
            DispenseStatus::Delivered => Ok(DispenseEvent::Deliver),
            DispenseStatus::Pending => Err(EdError::Validation(
                "a dispense request cannot be moved back to PENDING".to_string(),
            )),
        }
    }
}

/// 分诊事件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriageEvent {
    Attend,
    Discharge,
    Decease,
    Transfer,
}

impl TriageEvent {
    /// 目标状态对应的事件；WAITING 没有入口
    pub fn toward(target: TriageState) -> Option<Self> {
        match target {
            TriageState::Waiting => None,
            TriageState::BeingSeen => Some(TriageEvent::Attend),
            TriageState::Discharged => Some(TriageEvent::Discharge),
            TriageState::Deceased => Some(TriageEvent::Decease),
            TriageState::Transferred => Some(TriageEvent::Transfer),
        }
    }
}

/// 转换表
#[derive(Debug)]
pub struct StateMachine<S, E> {
    transitions: HashMap<(S, E), S>,
}

impl<S, E> StateMachine<S, E>
where
    S: Copy + Eq + Hash + Display,
    E: Copy + Eq + Hash + Debug,
{
    fn from_rules(rules: &[(S, E, S)]) -> Self {
        let transitions = rules
            .iter()
            .map(|&(from, event, to)| ((from, event), to))
            .collect();
        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: S, event: E) -> bool {
        self.transitions.contains_key(&(from, event))
    }

    /// 执行状态转换
    pub fn transition(&self, from: S, event: E) -> Result<S> {
        match self.transitions.get(&(from, event)) {
            Some(to) => Ok(*to),
            None => Err(EdError::InvalidStateTransition {
                from: from.to_string(),
                event: format!("{:?}", event),
            }),
        }
    }

    /// 当前状态下可触发的事件
    pub fn possible_events(&self, current: S) -> Vec<E> {
        self.transitions
            .keys()
            .filter(|(state, _)| *state == current)
            .map(|(_, event)| *event)
            .collect()
    }
}

impl StateMachine<OrderStatus, OrderEvent> {
    /// PENDING 是唯一的非终态
    pub fn orders() -> Self {
        use OrderEvent::*;
        use OrderStatus::*;

        Self::from_rules(&[
            (Pending, Fulfil, Fulfilled),
            (Pending, MarkNotPerformed, NotPerformed),
            (Pending, Cancel, Cancelled),
        ])
    }
}

impl StateMachine<DispenseStatus, DispenseEvent> {
    pub fn dispenses() -> Self {
        use DispenseEvent::*;
        use DispenseStatus::*;

        Self::from_rules(&[
            (Pending, MarkReady, Ready),
            (Ready, Deliver, Delivered),
            (Pending, Deliver, Delivered),
        ])
    }
}

impl StateMachine<TriageState, TriageEvent> {
    /// 转诊后仍可由专科医生结案
    pub fn triage() -> Self {
        use TriageEvent::*;
        use TriageState::*;

        Self::from_rules(&[
            (Waiting, Attend, BeingSeen),
            (BeingSeen, Attend, BeingSeen),
            (Waiting, Discharge, Discharged),
            (Waiting, Decease, Deceased),
            (Waiting, Transfer, Transferred),
            (BeingSeen, Discharge, Discharged),
            (BeingSeen, Decease, Deceased),
            (BeingSeen, Transfer, Transferred),
            (Transferred, Discharge, Discharged),
            (Transferred, Decease, Deceased),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_transitions_only_leave_pending() {
        let sm = StateMachine::orders();

        assert!(sm.can_transition(OrderStatus::Pending, OrderEvent::Fulfil));
        assert!(sm.can_transition(OrderStatus::Pending, OrderEvent::Cancel));
        assert!(!sm.can_transition(OrderStatus::Fulfilled, OrderEvent::MarkNotPerformed));
        assert!(!sm.can_transition(OrderStatus::Cancelled, OrderEvent::Fulfil));
        assert!(sm.possible_events(OrderStatus::NotPerformed).is_empty());
    }

    #[test]
    fn test_dispense_may_skip_ready() {
        let sm = StateMachine::dispenses();

        assert_eq!(
            sm.transition(DispenseStatus::Pending, DispenseEvent::Deliver).unwrap(),
            DispenseStatus::Delivered
        );
        assert!(sm.transition(DispenseStatus::Delivered, DispenseEvent::MarkReady).is_err());
    }

    #[test]
    fn test_triage_terminal_states() {
        let sm = StateMachine::triage();

        assert!(sm.transition(TriageState::Discharged, TriageEvent::Attend).is_err());
        assert!(sm.transition(TriageState::Deceased, TriageEvent::Discharge).is_err());
        assert_eq!(
            sm.transition(TriageState::Transferred, TriageEvent::Decease).unwrap(),
            TriageState::Deceased
        );
        assert!(sm.transition(TriageState::Transferred, TriageEvent::Attend).is_err());
    }

    #[test]
    fn test_waiting_has_no_entry_event() {
        assert_eq!(TriageEvent::toward(TriageState::Waiting), None);
        assert_eq!(TriageEvent::toward(TriageState::BeingSeen), Some(TriageEvent::Attend));
    }

    #[test]
    fn test_order_outcome_targets() {
        assert_eq!(OrderEvent::toward(OrderStatus::Fulfilled).unwrap(), OrderEvent::Fulfil);
        let err = OrderEvent::toward(OrderStatus::Cancelled).unwrap_err();
        assert_eq!(err.kind(), ed_core::ErrorKind::Invalid);
    }

    #[test]
    fn test_invalid_transition_error_names_states() {
        let err = StateMachine::orders()
            .transition(OrderStatus::Fulfilled, OrderEvent::Cancel)
            .unwrap_err();

        match err {
            EdError::InvalidStateTransition { from, event } => {
                assert_eq!(from, "FULFILLED");
                assert_eq!(event, "Cancel");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
