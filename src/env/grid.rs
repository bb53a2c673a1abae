//! Grid-world maze environment
//!
//! The agent walks on a rectangular occupancy grid towards a goal cell.
//! Obstacles and the grid edge reject moves (the agent stays put and pays a
//! wall penalty). Observations are the raw integer coordinates
//! `(agent_x, agent_y, goal_x, goal_y)`; scaling is left to the agent.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::action::{Direction, Position};
use super::{Observation, StepResult};
use crate::error::{Result, SandboxError};
use crate::params::ParamSpec;

/// Smallest and largest supported grid side
pub const MIN_SIDE: usize = 4;
pub const MAX_SIDE: usize = 20;

/// Occupancy of a single cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Free,
    Obstacle,
}

/// Which administrative marker [`GridEnv::nudge`] moves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NudgeTarget {
    /// The home position (the agent follows it)
    Spawn,
    Goal,
}

/// Layout and reward configuration for [`GridEnv`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GridConfig {
    pub rows: usize,
    pub cols: usize,
    /// Probability that any cell becomes an obstacle on `randomize`
    pub obstacle_probability: f64,

    /// Bonus when the goal is reached
    pub goal: f32,
    /// Reward applied to every step
    pub survival: f32,
    /// Added when a move is rejected
    pub damage: f32,
    /// Added when the Manhattan distance to the goal strictly decreased
    pub progress_bonus: f32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            rows: 10,
            cols: 10,
            obstacle_probability: 0.15,
            goal: 100.0,
            survival: -1.0,
            damage: -10.0,
            progress_bonus: 0.1,
        }
    }
}

impl GridConfig {
    pub const REWARD_SPECS: &'static [ParamSpec] = &[
        ParamSpec::new("goal", "Goal Reward", 100.0),
        ParamSpec::new("survival", "Survival Penalty", -1.0),
        ParamSpec::new("damage", "Wall Penalty", -10.0),
    ];

    pub const LAYOUT_SPECS: &'static [ParamSpec] = &[ParamSpec::ranged(
        "rows",
        "Grid size",
        MIN_SIDE as f32,
        MAX_SIDE as f32,
        1.0,
        10.0,
    )];

    /// Set a reward parameter by id
    ///
    /// Layout changes go through [`GridEnv::resize`] since they invalidate
    /// the current grid.
    pub fn set(&mut self, name: &str, value: f32) -> Result<()> {
        match name {
            "goal" => self.goal = value,
            "survival" => self.survival = value,
            "damage" => self.damage = value,
            "progress_bonus" => self.progress_bonus = value,
            _ => {
                return Err(SandboxError::UnknownParameter {
                    owner: "grid environment",
                    name: name.to_string(),
                })
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (axis, side) in [("rows", self.rows), ("cols", self.cols)] {
            if !(MIN_SIDE..=MAX_SIDE).contains(&side) {
                return Err(SandboxError::invalid(format!(
                    "{axis} must be in [{MIN_SIDE}, {MAX_SIDE}], got {side}"
                )));
            }
        }
        if !(0.0..0.9).contains(&self.obstacle_probability) {
            return Err(SandboxError::invalid(format!(
                "obstacle_probability must be in [0, 0.9), got {}",
                self.obstacle_probability
            )));
        }
        Ok(())
    }
}

/// Grid-world environment state machine
///
/// Invariant: `agent`, `spawn` and `goal` are always inside the grid and on
/// free cells.
#[derive(Debug, Clone)]
pub struct GridEnv {
    pub config: GridConfig,
    grid: Vec<Vec<Cell>>,
    agent: Position,
    goal: Position,
    spawn: Position,
    rng: StdRng,
}

impl GridEnv {
    pub const NAME: &'static str = "Maze world";
    pub const NUM_ACTIONS: usize = 4;

    /// Fails when `config` does not validate
    pub fn new(config: GridConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_rng(config, StdRng::from_entropy()))
    }

    /// Create an environment whose layouts are reproducible
    pub fn with_seed(config: GridConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_rng(config, StdRng::seed_from_u64(seed)))
    }

    fn with_rng(config: GridConfig, rng: StdRng) -> Self {
        let mut env = Self {
            grid: Vec::new(),
            agent: Position::new(0, 0),
            goal: Position::new(0, 0),
            spawn: Position::new(0, 0),
            config,
            rng,
        };
        env.randomize();
        env
    }

    /// Regenerate obstacles, then place goal and spawn on distinct free cells
    pub fn randomize(&mut self) {
        let (rows, cols) = (self.config.rows, self.config.cols);
        loop {
            let probability = self.config.obstacle_probability;
            let rng = &mut self.rng;
            self.grid = (0..rows)
                .map(|_| {
                    (0..cols)
                        .map(|_| {
                            if rng.gen_bool(probability) {
                                Cell::Obstacle
                            } else {
                                Cell::Free
                            }
                        })
                        .collect()
                })
                .collect();

            if self.free_cells().len() >= 2 {
                break;
            }
        }

        // Placeholder goal outside the grid so the first draw is unconstrained
        self.goal = Position::new(-1, -1);
        self.goal = self.random_free_cell();
        self.spawn = self.random_free_cell();
        self.agent = self.spawn;
    }

    /// Change the grid dimensions and regenerate the layout
    pub fn resize(&mut self, rows: usize, cols: usize) -> Result<()> {
        let resized = GridConfig {
            rows,
            cols,
            ..self.config.clone()
        };
        resized.validate()?;
        self.config = resized;
        self.randomize();
        Ok(())
    }

    /// Start a new episode
    ///
    /// With `go_to_home` the agent returns to the spawn point; otherwise it is
    /// relocated to a new random free cell which also becomes the new home.
    pub fn reset(&mut self, go_to_home: bool) -> Observation {
        if go_to_home {
            self.agent = self.spawn;
        } else {
            self.agent = self.random_free_cell();
            self.spawn = self.agent;
        }
        self.observation()
    }

    /// Attempt a move; action indices are up, down, left, right
    pub fn step(&mut self, action: usize) -> StepResult {
        let c = &self.config;
        let mut reward = c.survival;
        let before = self.agent.manhattan(self.goal);

        let target = Direction::from_index(action).map(|dir| self.agent.moved_in_direction(dir));
        match target {
            Some(pos) if self.is_free(pos) => self.agent = pos,
            _ => reward += c.damage,
        }

        if self.agent.manhattan(self.goal) < before {
            reward += c.progress_bonus;
        }

        let done = self.agent == self.goal;
        if done {
            reward += c.goal;
        }

        StepResult {
            observation: self.observation(),
            reward,
            done,
        }
    }

    /// Move the spawn point or the goal by one cell during configuration
    ///
    /// Returns `false` without mutating anything when the destination is out
    /// of bounds, an obstacle, or the other marker's cell. Moving the spawn
    /// also moves the agent.
    pub fn nudge(&mut self, target: NudgeTarget, dx: i32, dy: i32) -> bool {
        let current = match target {
            NudgeTarget::Spawn => self.spawn,
            NudgeTarget::Goal => self.goal,
        };
        let destination = current.moved_by(dx, dy);
        let collides = match target {
            NudgeTarget::Spawn => destination == self.goal,
            NudgeTarget::Goal => destination == self.spawn || destination == self.agent,
        };
        if collides || !self.is_free(destination) {
            return false;
        }

        match target {
            NudgeTarget::Spawn => {
                self.spawn = destination;
                self.agent = destination;
            }
            NudgeTarget::Goal => self.goal = destination,
        }
        true
    }

    pub fn observation(&self) -> Observation {
        [
            self.agent.x as f32,
            self.agent.y as f32,
            self.goal.x as f32,
            self.goal.y as f32,
        ]
    }

    pub fn in_bounds(&self, pos: Position) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as usize) < self.config.cols && (pos.y as usize) < self.config.rows
    }

    /// In bounds and not an obstacle
    pub fn is_free(&self, pos: Position) -> bool {
        self.in_bounds(pos) && self.grid[pos.y as usize][pos.x as usize] == Cell::Free
    }

    /// Occupancy matrix indexed `[y][x]`
    pub fn grid(&self) -> &[Vec<Cell>] {
        &self.grid
    }

    pub fn agent(&self) -> Position {
        self.agent
    }

    pub fn goal(&self) -> Position {
        self.goal
    }

    pub fn spawn(&self) -> Position {
        self.spawn
    }

    pub fn rows(&self) -> usize {
        self.config.rows
    }

    pub fn cols(&self) -> usize {
        self.config.cols
    }

    fn free_cells(&self) -> Vec<Position> {
        let mut cells = Vec::new();
        for (y, row) in self.grid.iter().enumerate() {
            for (x, cell) in row.iter().enumerate() {
                if *cell == Cell::Free {
                    cells.push(Position::new(x as i32, y as i32));
                }
            }
        }
        cells
    }

    /// A random free cell other than the goal
    fn random_free_cell(&mut self) -> Position {
        let goal = self.goal;
        let candidates: Vec<Position> = self
            .free_cells()
            .into_iter()
            .filter(|pos| *pos != goal)
            .collect();
        // randomize() guarantees two free cells, so one always remains
        *candidates
            .choose(&mut self.rng)
            .unwrap_or(&self.agent)
    }

    #[cfg(test)]
    fn set_layout(&mut self, grid: Vec<Vec<Cell>>, agent: Position, goal: Position) {
        self.config.rows = grid.len();
        self.config.cols = grid[0].len();
        self.grid = grid;
        self.agent = agent;
        self.spawn = agent;
        self.goal = goal;
    }
}
