//! Frame-budgeted environment probe re-rendering
//!
//! Each probe is a cube of six faces. Faces are rendered a few probes per
//! frame and tracked in a 6-bit mask. A complete mask is never rendered again
//! until an invalidation clears it.

use std::collections::VecDeque;

use cgmath::{MetricSpace, Point3};

use crate::bounds::Aabb;
use crate::constants::probes::{ALL_FACES, DEFAULT_FRAME_BUDGET, FACE_COUNT};
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProbeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Normal,
    /// Takes the first slot of the next frame, nearest to the camera first
    Urgent,
}

/// Placement and influence volume of a probe
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeDesc {
    pub position: Point3<f32>,
    pub volume: Aabb,
}

/// One probe scheduled for this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeRequest {
    pub probe: ProbeId,
    pub urgent: bool,
    /// Faces already rendered when the request was dequeued
    pub faces_done: u8,
}

impl ProbeRequest {
    /// Faces left to render, in order
    pub fn missing_faces(&self) -> impl Iterator<Item = u8> {
        let done = self.faces_done;
        (0..FACE_COUNT).filter(move |face| done & (1 << *face) == 0)
    }

    /// Nothing rendered yet, a full re-render from face 0
    pub fn is_full_render(&self) -> bool {
        self.faces_done == 0
    }
}

#[derive(Debug)]
struct ProbeRecord {
    desc: ProbeDesc,
    faces_done: u8,
    queued: Option<Urgency>,
}

#[derive(Debug)]
pub struct ProbeScheduler {
    probes: Vec<ProbeRecord>,
    urgent: Vec<ProbeId>,
    normal: VecDeque<ProbeId>,
    budget: usize,
    frame: Vec<ProbeRequest>,
}

impl Default for ProbeScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_BUDGET)
    }
}

impl ProbeScheduler {
    /// Scheduler rendering at most `budget` probes per frame
    pub fn new(budget: usize) -> Self {
        Self {
            probes: Vec::new(),
            urgent: Vec::new(),
            normal: VecDeque::new(),
            budget,
            frame: Vec::with_capacity(budget),
        }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn set_budget(&mut self, budget: usize) {
        self.budget = budget;
    }

    /// Add a probe. It starts with no faces rendered and queued as normal.
    pub fn register(&mut self, desc: ProbeDesc) -> ProbeId {
        let id = ProbeId(self.probes.len() as u32);
        self.probes.push(ProbeRecord {
            desc,
            faces_done: 0,
            queued: Some(Urgency::Normal),
        });
        self.normal.push_back(id);
        id
    }

    fn record_mut(&mut self, id: ProbeId) -> EngineResult<&mut ProbeRecord> {
        self.probes
            .get_mut(id.0 as usize)
            .ok_or_else(|| EngineError::ResourceNotFound {
                resource_type: "probe".to_string(),
                id: id.0.to_string(),
            })
    }

    /// Queue `id` for rendering. A queued probe is never duplicated; an
    /// urgent request promotes a normal one. Complete probes are ignored.
    pub fn request(&mut self, id: ProbeId, urgency: Urgency) -> EngineResult<()> {
        self.record_mut(id)?;
        self.enqueue(id, urgency);
        Ok(())
    }

    fn enqueue(&mut self, id: ProbeId, urgency: Urgency) {
        let record = &mut self.probes[id.0 as usize];
        if record.faces_done == ALL_FACES {
            log::trace!("[ProbeScheduler] Probe {} already complete", id.0);
            return;
        }

        match (record.queued, urgency) {
            (Some(Urgency::Urgent), _) | (Some(Urgency::Normal), Urgency::Normal) => {}
            (Some(Urgency::Normal), Urgency::Urgent) => {
                record.queued = Some(Urgency::Urgent);
                self.normal.retain(|queued| *queued != id);
                self.urgent.push(id);
            }
            (None, Urgency::Urgent) => {
                record.queued = Some(Urgency::Urgent);
                self.urgent.push(id);
            }
            (None, Urgency::Normal) => {
                record.queued = Some(Urgency::Normal);
                self.normal.push_back(id);
            }
        }
    }

    fn nearest_urgent(&self, camera: Point3<f32>) -> Option<usize> {
        self.urgent
            .iter()
            .enumerate()
            .map(|(i, id)| (i, self.probes[id.0 as usize].desc.position.distance2(camera)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    /// Dequeue this frame's probes: the nearest urgent one, then normal ones
    /// in request order. Leftover budget goes to further urgent probes.
    /// Dequeued probes leave the queues; call `end_frame` to return the ones
    /// that did not finish.
    pub fn next_frame(&mut self, camera: Point3<f32>) -> &[ProbeRequest] {
        self.frame.clear();

        if self.budget > 0 {
            if let Some(i) = self.nearest_urgent(camera) {
                let id = self.urgent.swap_remove(i);
                self.take(id, true);
            }
        }

        while self.frame.len() < self.budget {
            let Some(id) = self.normal.pop_front() else {
                break;
            };
            self.take(id, false);
        }

        while self.frame.len() < self.budget {
            let Some(i) = self.nearest_urgent(camera) else {
                break;
            };
            let id = self.urgent.swap_remove(i);
            self.take(id, true);
        }

        if !self.frame.is_empty() {
            log::trace!(
                "[ProbeScheduler] {} probes this frame, {} pending",
                self.frame.len(),
                self.pending()
            );
        }
        &self.frame
    }

    fn take(&mut self, id: ProbeId, urgent: bool) {
        let record = &mut self.probes[id.0 as usize];
        record.queued = None;
        // Completed while queued
        if record.faces_done == ALL_FACES {
            return;
        }
        self.frame.push(ProbeRequest {
            probe: id,
            urgent,
            faces_done: record.faces_done,
        });
    }

    /// Mark every missing face of the current frame's requests rendered
    pub fn complete_frame(&mut self) {
        for request in &self.frame {
            self.probes[request.probe.0 as usize].faces_done = ALL_FACES;
        }
    }

    /// Close the current frame. Requests left incomplete and not queued again
    /// go back to the front of their queue, keeping the faces already done.
    /// Returns how many were re-queued.
    pub fn end_frame(&mut self) -> usize {
        let mut requeued = 0;
        // Reverse so push_front restores the original order
        for request in self.frame.iter().rev() {
            let record = &mut self.probes[request.probe.0 as usize];
            if record.faces_done == ALL_FACES || record.queued.is_some() {
                continue;
            }
            if request.urgent {
                record.queued = Some(Urgency::Urgent);
                self.urgent.push(request.probe);
            } else {
                record.queued = Some(Urgency::Normal);
                self.normal.push_front(request.probe);
            }
            requeued += 1;
        }
        self.frame.clear();

        if requeued > 0 {
            log::debug!("[ProbeScheduler] {} unfinished probes re-queued", requeued);
        }
        requeued
    }

    /// Record one rendered cube face
    pub fn mark_face_rendered(&mut self, id: ProbeId, face: u8) -> EngineResult<()> {
        if face >= FACE_COUNT {
            return Err(EngineError::Internal {
                message: format!("probe face {} out of range", face),
            });
        }
        let record = self.record_mut(id)?;
        record.faces_done |= 1 << face;
        Ok(())
    }

    /// Clear the mask and queue a full re-render
    pub fn invalidate(&mut self, id: ProbeId) -> EngineResult<()> {
        self.record_mut(id)?.faces_done = 0;
        self.enqueue(id, Urgency::Normal);
        Ok(())
    }

    /// Invalidate every probe whose volume overlaps `region`, for an entity
    /// or light that moved there. Returns how many were invalidated.
    pub fn invalidate_volume(&mut self, region: &Aabb) -> usize {
        let hits: Vec<ProbeId> = self
            .probes
            .iter()
            .enumerate()
            .filter(|(_, record)| record.desc.volume.intersects(region))
            .map(|(i, _)| ProbeId(i as u32))
            .collect();

        for id in &hits {
            self.probes[id.0 as usize].faces_done = 0;
            self.enqueue(*id, Urgency::Normal);
        }
        if !hits.is_empty() {
            log::debug!("[ProbeScheduler] Invalidated {} probes by volume", hits.len());
        }
        hits.len()
    }

    /// Invalidate everything, e.g. after a material change
    pub fn invalidate_all(&mut self) {
        for i in 0..self.probes.len() {
            self.probes[i].faces_done = 0;
            self.enqueue(ProbeId(i as u32), Urgency::Normal);
        }
        log::debug!("[ProbeScheduler] Invalidated all {} probes", self.probes.len());
    }

    /// Queued requests not yet dequeued
    pub fn pending(&self) -> usize {
        self.urgent.len() + self.normal.len()
    }

    pub fn faces_done(&self, id: ProbeId) -> Option<u8> {
        self.probes.get(id.0 as usize).map(|record| record.faces_done)
    }

    pub fn is_complete(&self, id: ProbeId) -> bool {
        self.faces_done(id) == Some(ALL_FACES)
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}
