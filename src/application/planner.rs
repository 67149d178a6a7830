use crate::domain::models::{DailyPlan, Task, TimeBlock};
use crate::infrastructure::error::InfraError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanPhase {
    Empty,
    Generating,
    Ready,
    Editing,
}

impl PlanPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Generating => "generating",
            Self::Ready => "ready",
            Self::Editing => "editing",
        }
    }
}

// Plan lifecycle: empty -> generating -> ready, ready -> editing -> ready,
// ready -> generating (regenerate). Generation hands out tickets so a stale
// async completion cannot clobber a newer plan: only the latest ticket
// commits.
#[derive(Debug, Default)]
pub struct PlanBoard {
    phase: Option<PlanPhase>,
    plan: Option<DailyPlan>,
    scratch: Vec<TimeBlock>,
    generation: u64,
}

impl PlanBoard {
    pub fn phase(&self) -> PlanPhase {
        self.phase.unwrap_or(PlanPhase::Empty)
    }

    pub fn plan(&self) -> Option<&DailyPlan> {
        self.plan.as_ref()
    }

    pub fn scratch_blocks(&self) -> &[TimeBlock] {
        &self.scratch
    }

    pub fn begin_generation(&mut self) -> Result<u64, InfraError> {
        if self.phase() == PlanPhase::Editing {
            return Err(InfraError::InvalidConfig(
                "save or cancel plan edits before regenerating".to_string(),
            ));
        }
        self.phase = Some(PlanPhase::Generating);
        self.generation += 1;
        Ok(self.generation)
    }

    pub fn complete_generation(&mut self, ticket: u64, plan: DailyPlan) -> bool {
        if ticket != self.generation {
            return false;
        }
        self.plan = Some(plan);
        self.phase = Some(PlanPhase::Ready);
        true
    }

    pub fn replace_plan(&mut self, plan: DailyPlan) -> Result<(), InfraError> {
        if self.phase() == PlanPhase::Editing {
            return Err(InfraError::InvalidConfig(
                "save or cancel plan edits before replacing the plan".to_string(),
            ));
        }
        self.plan = Some(plan);
        self.phase = Some(PlanPhase::Ready);
        Ok(())
    }

    pub fn begin_edit(&mut self) -> Result<(), InfraError> {
        if self.phase() != PlanPhase::Ready {
            return Err(InfraError::InvalidConfig(
                "plan must be ready before editing".to_string(),
            ));
        }
        let Some(plan) = self.plan.as_ref() else {
            return Err(InfraError::InvalidConfig("no plan to edit".to_string()));
        };
        self.scratch = plan.time_blocks.clone();
        self.phase = Some(PlanPhase::Editing);
        Ok(())
    }

    // Positional move: remove the source block, re-insert it at the index the
    // target block occupied before the removal. Every other block keeps its
    // relative order.
    pub fn move_block(&mut self, source_id: &str, target_id: &str) -> Result<(), InfraError> {
        if self.phase() != PlanPhase::Editing {
            return Err(InfraError::InvalidConfig(
                "plan is not in edit mode".to_string(),
            ));
        }
        if source_id == target_id {
            return Ok(());
        }

        let source_index = self
            .scratch
            .iter()
            .position(|block| block.id == source_id)
            .ok_or_else(|| {
                InfraError::InvalidConfig(format!("unknown source block: {source_id}"))
            })?;
        let target_index = self
            .scratch
            .iter()
            .position(|block| block.id == target_id)
            .ok_or_else(|| {
                InfraError::InvalidConfig(format!("unknown target block: {target_id}"))
            })?;

        let moved = self.scratch.remove(source_index);
        self.scratch.insert(target_index.min(self.scratch.len()), moved);
        Ok(())
    }

    pub fn save_edit(&mut self) -> Result<(), InfraError> {
        if self.phase() != PlanPhase::Editing {
            return Err(InfraError::InvalidConfig(
                "plan is not in edit mode".to_string(),
            ));
        }
        let Some(plan) = self.plan.as_mut() else {
            return Err(InfraError::InvalidConfig("no plan to save".to_string()));
        };
        plan.time_blocks = std::mem::take(&mut self.scratch);
        self.phase = Some(PlanPhase::Ready);
        Ok(())
    }

    pub fn cancel_edit(&mut self) -> Result<(), InfraError> {
        if self.phase() != PlanPhase::Editing {
            return Err(InfraError::InvalidConfig(
                "plan is not in edit mode".to_string(),
            ));
        }
        self.scratch.clear();
        self.phase = Some(PlanPhase::Ready);
        Ok(())
    }
}

// Matches a time block to a task: stored task id first, then exact title,
// then case-insensitive containment in either direction, where containment
// holds for a plain substring or for one side's words all appearing in the
// other ("write the report" matches "Write report"). First match wins; no
// disambiguation when several tasks match.
pub fn match_block_to_task<'a>(block: &TimeBlock, tasks: &'a [Task]) -> Option<&'a Task> {
    if let Some(task_id) = block.task_id.as_deref() {
        if let Some(task) = tasks.iter().find(|task| task.id == task_id) {
            return Some(task);
        }
    }

    let label = block.task_label.trim();
    if label.is_empty() {
        return None;
    }
    if let Some(task) = tasks.iter().find(|task| task.title == label) {
        return Some(task);
    }

    let label_lower = label.to_lowercase();
    tasks.iter().find(|task| {
        let title_lower = task.title.trim().to_lowercase();
        !title_lower.is_empty() && titles_contain_each_other(&title_lower, &label_lower)
    })
}

fn titles_contain_each_other(left: &str, right: &str) -> bool {
    if left.contains(right) || right.contains(left) {
        return true;
    }
    words_contained(left, right) || words_contained(right, left)
}

fn words_contained(needle: &str, haystack: &str) -> bool {
    let haystack_words: Vec<&str> = haystack
        .split(|character: char| !character.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect();
    let mut needle_words = needle
        .split(|character: char| !character.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .peekable();
    if needle_words.peek().is_none() {
        return false;
    }
    needle_words.all(|word| haystack_words.contains(&word))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{BlockType, EnergyLevel, Priority};
    use chrono::Utc;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn block(id: &str, label: &str) -> TimeBlock {
        TimeBlock {
            id: id.to_string(),
            start_time: "09:00".to_string(),
            end_time: "10:00".to_string(),
            task_id: None,
            task_label: label.to_string(),
            block_type: BlockType::Focus,
            energy_level: EnergyLevel::High,
            priority: Priority::Medium,
        }
    }

    fn plan_with_blocks(ids: &[&str]) -> DailyPlan {
        DailyPlan {
            time_blocks: ids
                .iter()
                .map(|id| block(id, &format!("Block {id}")))
                .collect(),
            insights: vec!["ready".to_string()],
            recommendations: Vec::new(),
            total_focus_minutes: 60,
            productivity_score: 70,
        }
    }

    fn task(id: &str, title: &str) -> Task {
        Task {
            id: id.to_string(),
            title: title.to_string(),
            description: None,
            subtasks: Vec::new(),
            tags: Vec::new(),
            priority: Priority::Medium,
            category: "general".to_string(),
            estimated_time: "30 minutes".to_string(),
            due_date: None,
            due_time: None,
            completed: false,
            created_at: Utc::now(),
        }
    }

    fn ready_board(ids: &[&str]) -> PlanBoard {
        let mut board = PlanBoard::default();
        let ticket = board.begin_generation().expect("begin generation");
        assert!(board.complete_generation(ticket, plan_with_blocks(ids)));
        board
    }

    #[test]
    fn starts_empty_and_moves_through_generation() {
        let mut board = PlanBoard::default();
        assert_eq!(board.phase(), PlanPhase::Empty);

        let ticket = board.begin_generation().expect("begin");
        assert_eq!(board.phase(), PlanPhase::Generating);
        assert!(board.complete_generation(ticket, plan_with_blocks(&["a"])));
        assert_eq!(board.phase(), PlanPhase::Ready);
        assert!(board.plan().is_some());
    }

    #[test]
    fn stale_generation_results_are_dropped() {
        let mut board = PlanBoard::default();
        let first = board.begin_generation().expect("first");
        let second = board.begin_generation().expect("second");

        assert!(!board.complete_generation(first, plan_with_blocks(&["stale"])));
        assert_eq!(board.phase(), PlanPhase::Generating);

        assert!(board.complete_generation(second, plan_with_blocks(&["fresh"])));
        let plan = board.plan().expect("plan");
        assert_eq!(plan.time_blocks[0].id, "fresh");
    }

    #[test]
    fn editing_requires_a_ready_plan() {
        let mut board = PlanBoard::default();
        assert!(board.begin_edit().is_err());
        assert!(board.move_block("a", "b").is_err());
        assert!(board.save_edit().is_err());
        assert!(board.cancel_edit().is_err());
    }

    #[test]
    fn regenerate_is_blocked_while_editing() {
        let mut board = ready_board(&["a", "b"]);
        board.begin_edit().expect("edit");
        assert!(board.begin_generation().is_err());
        assert!(board.replace_plan(plan_with_blocks(&["c"])).is_err());
    }

    #[test]
    fn save_commits_the_scratch_order() {
        let mut board = ready_board(&["a", "b", "c"]);
        board.begin_edit().expect("edit");
        board.move_block("c", "a").expect("move");
        board.save_edit().expect("save");

        let ids: Vec<&str> = board
            .plan()
            .expect("plan")
            .time_blocks
            .iter()
            .map(|block| block.id.as_str())
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(board.phase(), PlanPhase::Ready);
    }

    #[test]
    fn cancel_reverts_to_the_saved_plan() {
        let mut board = ready_board(&["a", "b", "c"]);
        board.begin_edit().expect("edit");
        board.move_block("a", "c").expect("move");
        board.cancel_edit().expect("cancel");

        let ids: Vec<&str> = board
            .plan()
            .expect("plan")
            .time_blocks
            .iter()
            .map(|block| block.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn move_to_same_block_is_a_no_op() {
        let mut board = ready_board(&["a", "b"]);
        board.begin_edit().expect("edit");
        board.move_block("a", "a").expect("move");
        let ids: Vec<&str> = board
            .scratch_blocks()
            .iter()
            .map(|block| block.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    proptest! {
        // Reordering is a pure permutation: the multiset of blocks is
        // unchanged by any sequence of moves plus save.
        #[test]
        fn moves_preserve_the_block_multiset(
            size in 2usize..8usize,
            moves in prop::collection::vec((0usize..8usize, 0usize..8usize), 0..12)
        ) {
            let ids: Vec<String> = (0..size).map(|index| format!("blk-{index}")).collect();
            let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
            let mut board = ready_board(&id_refs);
            board.begin_edit().expect("edit");

            for (source, target) in moves {
                let source_id = &ids[source % size];
                let target_id = &ids[target % size];
                board.move_block(source_id, target_id).expect("move");
            }
            board.save_edit().expect("save");

            let mut counts: BTreeMap<String, usize> = BTreeMap::new();
            for block in &board.plan().expect("plan").time_blocks {
                *counts.entry(block.id.clone()).or_insert(0) += 1;
            }
            prop_assert_eq!(counts.len(), size);
            prop_assert!(counts.values().all(|count| *count == 1));
        }
    }

    #[test]
    fn match_prefers_exact_title() {
        let tasks = vec![task("1", "Write report"), task("2", "Write")];
        let mut candidate = block("blk-1", "Write");
        candidate.task_id = None;
        let matched = match_block_to_task(&candidate, &tasks).expect("match");
        assert_eq!(matched.id, "2");
    }

    #[test]
    fn match_is_case_insensitive_in_either_direction() {
        let tasks = vec![task("1", "Write report")];

        let matched = match_block_to_task(&block("blk-1", "write the report"), &tasks)
            .expect("word containment match");
        assert_eq!(matched.id, "1");

        let matched = match_block_to_task(&block("blk-2", "WRITE REPORT and send it"), &tasks)
            .expect("substring match");
        assert_eq!(matched.id, "1");

        let matched =
            match_block_to_task(&block("blk-3", "report"), &tasks).expect("label in title");
        assert_eq!(matched.id, "1");
    }

    #[test]
    fn match_prefers_task_id_when_present() {
        let tasks = vec![task("1", "Write report"), task("2", "Other")];
        let mut candidate = block("blk-1", "unrelated label");
        candidate.task_id = Some("2".to_string());
        let matched = match_block_to_task(&candidate, &tasks).expect("match");
        assert_eq!(matched.id, "2");
    }

    #[test]
    fn match_returns_none_without_candidates() {
        let tasks = vec![task("1", "Write report")];
        let candidate = block("blk-1", "water the plants");
        assert!(match_block_to_task(&candidate, &tasks).is_none());
    }
}
