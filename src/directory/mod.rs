//! Program directory: which programs exist, which PIDs carry tables, which
//! carry payload, and which programs currently own an output route.
//!
//! Updated only from applied PAT/PMT tables and selection requests. A
//! rejected table never reaches this module, so the last good state stays.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::constants::{is_si_table_id, NULL_PID, SYSTEM_PIDS};
use crate::psi::{PatEntry, PatSection, PmtSection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Selection {
    Unselected,
    /// Transient mark while a selection request is being applied.
    PendingDeactivation,
    Selected,
}

/// Opaque handle of one program's output route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RouteId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamEntry {
    pub pid: u16,
    pub stream_type: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgramEntry {
    pub program_number: u16,
    /// `None` for placeholders created by a selection request before any PAT.
    pub pmt_pid: Option<u16>,
    pub pcr_pid: Option<u16>,
    pub pmt: Option<PmtSection>,
    pub streams: Vec<StreamEntry>,
    /// Number of PAT snapshots (current and previous) listing this program.
    pub patcount: u32,
    pub selection: Selection,
    pub route: Option<RouteId>,
}

impl ProgramEntry {
    fn new(program_number: u16, pmt_pid: Option<u16>, selection: Selection) -> Self {
        Self {
            program_number,
            pmt_pid,
            pcr_pid: None,
            pmt: None,
            streams: Vec::new(),
            patcount: 0,
            selection,
            route: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.route.is_some()
    }

    fn references_pes(&self, pid: u16) -> bool {
        self.pcr_pid == Some(pid) || self.streams.iter().any(|s| s.pid == pid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum RouteChange {
    Added { program_number: u16, route: RouteId },
    Removed { program_number: u16, route: RouteId },
}

/// What applying one PAT changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PatUpdate {
    pub routes: Vec<RouteChange>,
    pub added_programs: Vec<u16>,
    pub removed_programs: Vec<u16>,
    /// Table PIDs no longer referenced; their reassembly state must go.
    pub discarded_streams: Vec<u16>,
}

/// One active program that owns a payload PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadRoute {
    pub program_number: u16,
    pub route: RouteId,
    /// `None` when the PID is only the program's PCR carrier.
    pub stream_type: Option<u8>,
}

#[derive(Debug)]
pub struct Directory {
    programs: BTreeMap<u16, ProgramEntry>,
    psi_pids: HashMap<u16, u32>,
    pes_pids: HashSet<u16>,
    last_pat: Option<Vec<PatEntry>>,
    select_all: bool,
    /// Explicitly requested programs; outlives the program entries.
    requested: BTreeSet<u16>,
    next_route: u32,
}

impl Default for Directory {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Directory {
    /// With `select_all`, every program seen in a PAT is selected until
    /// [`Directory::select_programs`] replaces the policy.
    pub fn new(select_all: bool) -> Self {
        let mut directory = Self {
            programs: BTreeMap::new(),
            psi_pids: HashMap::new(),
            pes_pids: HashSet::new(),
            last_pat: None,
            select_all,
            requested: BTreeSet::new(),
            next_route: 0,
        };
        directory.seed_system_pids();
        directory
    }

    fn seed_system_pids(&mut self) {
        for &pid in SYSTEM_PIDS {
            self.psi_pids.insert(pid, 1);
        }
    }

    fn add_psi_pid(&mut self, pid: u16) {
        *self.psi_pids.entry(pid).or_insert(0) += 1;
    }

    /// Returns true when the last reference went away.
    fn release_psi_pid(&mut self, pid: u16) -> bool {
        match self.psi_pids.get_mut(&pid) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                self.psi_pids.remove(&pid);
                true
            }
            None => false,
        }
    }

    /// Drops PES PIDs no remaining program references.
    fn release_pes_pids(&mut self, pids: impl IntoIterator<Item = u16>) {
        for pid in pids {
            if !self.programs.values().any(|p| p.references_pes(pid)) {
                self.pes_pids.remove(&pid);
            }
        }
    }

    fn activate(&mut self, program_number: u16) -> Option<RouteChange> {
        let program = self.programs.get_mut(&program_number)?;
        if program.route.is_some() {
            return None;
        }
        let route = RouteId(self.next_route);
        self.next_route += 1;
        program.route = Some(route);
        debug!(program_number, route = route.0, "program route added");
        Some(RouteChange::Added {
            program_number,
            route,
        })
    }

    fn deactivate(&mut self, program_number: u16) -> Option<RouteChange> {
        let program = self.programs.get_mut(&program_number)?;
        let route = program.route.take()?;
        debug!(program_number, route = route.0, "program route removed");
        Some(RouteChange::Removed {
            program_number,
            route,
        })
    }

    /// Applies a new PAT: first every listed program is added or refreshed,
    /// then every program of the previous PAT is released once. Programs
    /// listed in both keep their state and route untouched.
    pub fn apply_pat(&mut self, pat: &PatSection) -> PatUpdate {
        let mut update = PatUpdate::default();

        for entry in &pat.programs {
            let program_number = entry.program_number;
            let default_selection = self.initial_selection(program_number);
            let (old_pmt_pid, is_new) = match self.programs.get(&program_number) {
                Some(p) => (p.pmt_pid, false),
                None => (None, true),
            };
            if is_new {
                self.programs.insert(
                    program_number,
                    ProgramEntry::new(program_number, None, default_selection),
                );
                update.added_programs.push(program_number);
                debug!(program_number, pmt_pid = entry.pmt_pid, "new program");
            }
            if old_pmt_pid != Some(entry.pmt_pid) {
                if let Some(old) = old_pmt_pid {
                    debug!(program_number, old, new = entry.pmt_pid, "PMT PID changed");
                    if self.release_psi_pid(old) {
                        update.discarded_streams.push(old);
                    }
                }
                self.add_psi_pid(entry.pmt_pid);
            }

            let selected = match self.programs.get_mut(&program_number) {
                Some(program) => {
                    program.pmt_pid = Some(entry.pmt_pid);
                    program.patcount += 1;
                    program.selection == Selection::Selected
                }
                None => false,
            };
            if selected {
                update.routes.extend(self.activate(program_number));
            }
        }

        if let Some(previous) = self.last_pat.take() {
            for entry in previous {
                let remaining = match self.programs.get_mut(&entry.program_number) {
                    Some(program) => {
                        program.patcount = program.patcount.saturating_sub(1);
                        program.patcount
                    }
                    None => continue,
                };
                if remaining == 0 {
                    self.remove_program(entry.program_number, &mut update);
                }
            }
        }

        self.last_pat = Some(pat.programs.clone());
        update
    }

    fn initial_selection(&self, program_number: u16) -> Selection {
        if self.select_all || self.requested.contains(&program_number) {
            Selection::Selected
        } else {
            Selection::Unselected
        }
    }

    fn remove_program(&mut self, program_number: u16, update: &mut PatUpdate) {
        update.routes.extend(self.deactivate(program_number));
        let Some(program) = self.programs.remove(&program_number) else {
            return;
        };
        debug!(program_number, "program removed");
        self.release_pes_pids(
            program
                .streams
                .iter()
                .map(|s| s.pid)
                .chain(program.pcr_pid),
        );
        if let Some(pmt_pid) = program.pmt_pid {
            if self.release_psi_pid(pmt_pid) {
                update.discarded_streams.push(pmt_pid);
            }
        }
        update.removed_programs.push(program_number);
    }

    /// Records a PMT for a known program. Returns false (and changes
    /// nothing) when the program is unknown or the PMT arrived on a PID the
    /// PAT does not announce for it.
    pub fn apply_pmt(&mut self, pid: u16, pmt: PmtSection) -> bool {
        let program_number = pmt.program_number;
        let Some(program) = self.programs.get_mut(&program_number) else {
            debug!(pid, program_number, "PMT for unknown program");
            return false;
        };
        if program.pmt_pid != Some(pid) {
            debug!(pid, program_number, expected = ?program.pmt_pid, "PMT on unexpected PID");
            return false;
        }

        let old: Vec<u16> = program
            .streams
            .iter()
            .map(|s| s.pid)
            .chain(program.pcr_pid)
            .collect();

        program.streams = pmt
            .streams
            .iter()
            .map(|s| StreamEntry {
                pid: s.elementary_pid,
                stream_type: s.stream_type,
            })
            .collect();
        program.pcr_pid = (pmt.pcr_pid != NULL_PID).then_some(pmt.pcr_pid);
        let new: Vec<u16> = program
            .streams
            .iter()
            .map(|s| s.pid)
            .chain(program.pcr_pid)
            .collect();
        program.pmt = Some(pmt);

        self.release_pes_pids(old);
        self.pes_pids.extend(new);
        true
    }

    /// Replaces the selection with exactly `program_numbers`.
    ///
    /// Every program is first marked pending, requested ones are marked
    /// selected, and programs still pending lose their route. Requested
    /// programs no PAT has listed yet get placeholder entries and are
    /// activated once a PAT names them.
    pub fn select_programs(&mut self, program_numbers: &[u16]) -> Vec<RouteChange> {
        self.select_all = false;
        self.requested = program_numbers.iter().copied().collect();
        for &program_number in program_numbers {
            self.programs
                .entry(program_number)
                .or_insert_with(|| ProgramEntry::new(program_number, None, Selection::Unselected));
        }
        for program in self.programs.values_mut() {
            program.selection = Selection::PendingDeactivation;
        }
        for program_number in program_numbers {
            if let Some(program) = self.programs.get_mut(program_number) {
                program.selection = Selection::Selected;
            }
        }

        let mut changes = Vec::new();
        let numbers: Vec<u16> = self.programs.keys().copied().collect();
        for program_number in numbers {
            let Some(program) = self.programs.get_mut(&program_number) else {
                continue;
            };
            let in_pat = program.pmt_pid.is_some();
            let selection = program.selection;
            match selection {
                Selection::Selected if in_pat => {
                    changes.extend(self.activate(program_number));
                }
                Selection::PendingDeactivation => {
                    program.selection = Selection::Unselected;
                    changes.extend(self.deactivate(program_number));
                }
                _ => {}
            }
        }
        changes
    }

    /// Selects every known program and restores the select-all policy.
    pub fn select_all_programs(&mut self) -> Vec<RouteChange> {
        let numbers: Vec<u16> = self.programs.keys().copied().collect();
        let changes = self.select_programs(&numbers);
        self.select_all = true;
        changes
    }

    /// Whether packets on `pid` should go through section reassembly.
    ///
    /// Known table PIDs always do, known payload PIDs never do. Otherwise
    /// `table_id_hint` (the first section byte, or the last table id seen
    /// on the PID) must be a standard PSI/SI table id.
    pub fn carries_table(&self, pid: u16, table_id_hint: Option<u8>) -> bool {
        if self.is_psi_pid(pid) {
            return true;
        }
        if self.is_pes_pid(pid) {
            return false;
        }
        table_id_hint.is_some_and(is_si_table_id)
    }

    pub fn is_psi_pid(&self, pid: u16) -> bool {
        self.psi_pids.contains_key(&pid)
    }

    pub fn is_pes_pid(&self, pid: u16) -> bool {
        self.pes_pids.contains(&pid)
    }

    pub fn psi_refcount(&self, pid: u16) -> u32 {
        self.psi_pids.get(&pid).copied().unwrap_or(0)
    }

    /// Active programs owning `pid` as an elementary stream or PCR carrier.
    pub fn routes_for_pid(&self, pid: u16) -> Vec<PayloadRoute> {
        self.programs
            .values()
            .filter_map(|program| {
                let route = program.route?;
                let stream_type = program
                    .streams
                    .iter()
                    .find(|s| s.pid == pid)
                    .map(|s| s.stream_type);
                (stream_type.is_some() || program.pcr_pid == Some(pid)).then_some(PayloadRoute {
                    program_number: program.program_number,
                    route,
                    stream_type,
                })
            })
            .collect()
    }

    pub fn program(&self, program_number: u16) -> Option<&ProgramEntry> {
        self.programs.get(&program_number)
    }

    pub fn programs(&self) -> impl Iterator<Item = &ProgramEntry> {
        self.programs.values()
    }

    pub fn program_numbers(&self) -> Vec<u16> {
        self.programs.keys().copied().collect()
    }

    /// Drops every program and PID classification. Route removals for the
    /// programs that were active are returned so the output layer can
    /// tear them down. The selection policy is kept.
    pub fn reset(&mut self) -> Vec<RouteChange> {
        let numbers: Vec<u16> = self.programs.keys().copied().collect();
        let changes = numbers
            .into_iter()
            .filter_map(|n| self.deactivate(n))
            .collect();
        self.programs.clear();
        self.psi_pids.clear();
        self.pes_pids.clear();
        self.last_pat = None;
        self.seed_system_pids();
        changes
    }
}
