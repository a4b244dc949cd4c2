//! 叠加层状态机
//!
//! 管理单个文档视图从分类到渲染的状态转换。没有终止状态。

use bodymap_core::{BodyMapError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 叠加层状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OverlayState {
    Uninitialized,  // 尚未收到检查记录
    Selecting,      // 分类中
    CatalogLoading, // 等待坐标目录
    Errored,        // 目录加载失败，等待回退
    Ready,          // 发现已提取，等待显示尺寸
    Rendering,      // 可以渲染叠加层
}

/// 状态转换事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OverlayEvent {
    InputChanged,
    DiagramSelected,
    CatalogResolved,
    CatalogFailed,
    FallbackApplied,
    ImageReady,
    ViewSwitched,
    Reset,
}

/// 叠加层状态机
#[derive(Debug)]
pub struct OverlayStateMachine {
    transitions: HashMap<(OverlayState, OverlayEvent), OverlayState>,
}

impl OverlayStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        use OverlayEvent::*;
        use OverlayState::*;

        let mut transitions = HashMap::new();

        // 输入变化总是从分类重新开始
        for state in Self::get_all_states() {
            transitions.insert((state, InputChanged), Selecting);
        }

        transitions.insert((Selecting, DiagramSelected), CatalogLoading);
        transitions.insert((CatalogLoading, CatalogResolved), Ready);
        transitions.insert((CatalogLoading, CatalogFailed), Errored);
        transitions.insert((Errored, FallbackApplied), Ready);

        transitions.insert((Uninitialized, ImageReady), Uninitialized);
        transitions.insert((CatalogLoading, ImageReady), CatalogLoading);
        transitions.insert((Ready, ImageReady), Rendering);
        transitions.insert((Rendering, ImageReady), Rendering);

        transitions.insert((CatalogLoading, ViewSwitched), CatalogLoading);
        transitions.insert((Ready, ViewSwitched), CatalogLoading);
        transitions.insert((Rendering, ViewSwitched), CatalogLoading);

        transitions.insert((Uninitialized, Reset), Uninitialized);
        transitions.insert((CatalogLoading, Reset), Selecting);
        transitions.insert((Ready, Reset), Selecting);
        transitions.insert((Rendering, Reset), Selecting);

        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: &OverlayState, event: &OverlayEvent) -> bool {
        self.transitions.contains_key(&(*from, *event))
    }

    /// 执行状态转换
    pub fn transition(&self, from: &OverlayState, event: &OverlayEvent) -> Result<OverlayState> {
        match self.transitions.get(&(*from, *event)) {
            Some(to) => Ok(*to),
            None => Err(BodyMapError::InvalidStateTransition {
                from: format!("{:?}", from),
                event: format!("{:?}", event),
            }),
        }
    }

    /// 获取所有可能的状态
    pub fn get_all_states() -> Vec<OverlayState> {
        vec![
            OverlayState::Uninitialized,
            OverlayState::Selecting,
            OverlayState::CatalogLoading,
            OverlayState::Errored,
            OverlayState::Ready,
            OverlayState::Rendering,
        ]
    }

    /// 获取状态的所有可能事件
    pub fn get_possible_events(&self, current_state: &OverlayState) -> Vec<OverlayEvent> {
        self.transitions
            .keys()
            .filter(|(state, _)| state == current_state)
            .map(|(_, event)| *event)
            .collect()
    }
}

impl Default for OverlayStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
