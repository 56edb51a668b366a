use crate::error::{ModelError, ModelResult};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(u32);

        impl $name {
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }

            fn from_index(idx: usize) -> Self {
                debug_assert!(idx <= u32::MAX as usize);
                Self(idx as u32)
            }
        }
    };
}

arena_id!(
    /// Handle of a [`Dimension`] inside its [`Schema`].
    DimensionId
);
arena_id!(
    /// Handle of a [`Hierarchy`] inside its [`Schema`].
    HierarchyId
);
arena_id!(
    /// Handle of a [`Level`] inside its [`Schema`].
    LevelId
);
arena_id!(
    /// Handle of a [`Member`] inside its [`Schema`].
    MemberId
);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DimensionKind {
    Standard,
    Measures,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberKind {
    Regular,
    /// The single root of a hierarchy that has an all level.
    All,
    /// The per-hierarchy null member (e.g. the parent of a root member).
    Null,
}

#[derive(Clone, Debug)]
pub struct Dimension {
    name: String,
    unique_name: String,
    kind: DimensionKind,
    hierarchies: Vec<HierarchyId>,
}

impl Dimension {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    pub fn kind(&self) -> DimensionKind {
        self.kind
    }

    pub fn hierarchies(&self) -> &[HierarchyId] {
        &self.hierarchies
    }

    /// The first declared hierarchy, used wherever a dimension stands in for a hierarchy.
    pub fn default_hierarchy(&self) -> Option<HierarchyId> {
        self.hierarchies.first().copied()
    }
}

#[derive(Clone, Debug)]
pub struct Hierarchy {
    name: String,
    unique_name: String,
    dimension: DimensionId,
    levels: Vec<LevelId>,
    all_member: Option<MemberId>,
    null_member: MemberId,
    default_member: Option<MemberId>,
}

impl Hierarchy {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    pub fn dimension(&self) -> DimensionId {
        self.dimension
    }

    pub fn levels(&self) -> &[LevelId] {
        &self.levels
    }

    pub fn has_all(&self) -> bool {
        self.all_member.is_some()
    }

    pub fn all_member(&self) -> Option<MemberId> {
        self.all_member
    }

    pub fn null_member(&self) -> MemberId {
        self.null_member
    }
}

#[derive(Clone, Debug)]
pub struct Level {
    name: String,
    unique_name: String,
    hierarchy: HierarchyId,
    depth: usize,
    members: Vec<MemberId>,
}

impl Level {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    pub fn hierarchy(&self) -> HierarchyId {
        self.hierarchy
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn members(&self) -> &[MemberId] {
        &self.members
    }
}

#[derive(Clone, Debug)]
pub struct Member {
    name: String,
    unique_name: String,
    kind: MemberKind,
    hierarchy: HierarchyId,
    level: Option<LevelId>,
    parent: Option<MemberId>,
    children: Vec<MemberId>,
    ordinal: usize,
}

impl Member {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    pub fn is_all(&self) -> bool {
        self.kind == MemberKind::All
    }

    pub fn is_null(&self) -> bool {
        self.kind == MemberKind::Null
    }

    pub fn hierarchy(&self) -> HierarchyId {
        self.hierarchy
    }

    /// `None` only for the null member.
    pub fn level(&self) -> Option<LevelId> {
        self.level
    }

    pub fn parent(&self) -> Option<MemberId> {
        self.parent
    }

    pub fn children(&self) -> &[MemberId] {
        &self.children
    }

    /// Position of the member inside its level.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }
}

/// Arena of dimensional metadata for one cube.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    name: String,
    dimensions: Vec<Dimension>,
    hierarchies: Vec<Hierarchy>,
    levels: Vec<Level>,
    members: Vec<Member>,
    dimension_index: AHashMap<String, DimensionId>,
    member_index: AHashMap<String, MemberId>,
}

fn normalize_name(name: &str) -> String {
    name.to_ascii_lowercase()
}

fn bracket(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimension(&self, id: DimensionId) -> &Dimension {
        &self.dimensions[id.index()]
    }

    pub fn hierarchy(&self, id: HierarchyId) -> &Hierarchy {
        &self.hierarchies[id.index()]
    }

    pub fn level(&self, id: LevelId) -> &Level {
        &self.levels[id.index()]
    }

    pub fn member(&self, id: MemberId) -> &Member {
        &self.members[id.index()]
    }

    pub fn dimension_ids(&self) -> impl Iterator<Item = DimensionId> + '_ {
        (0..self.dimensions.len()).map(DimensionId::from_index)
    }

    pub fn hierarchy_ids(&self) -> impl Iterator<Item = HierarchyId> + '_ {
        (0..self.hierarchies.len()).map(HierarchyId::from_index)
    }

    pub fn hierarchy_count(&self) -> usize {
        self.hierarchies.len()
    }

    /// Case-insensitive lookup by dimension name (without brackets).
    pub fn lookup_dimension(&self, name: &str) -> Option<DimensionId> {
        self.dimension_index.get(&normalize_name(name)).copied()
    }

    /// Case-insensitive lookup by unique name, e.g. `[Time].[1997].[Q1]`.
    pub fn lookup_member(&self, unique_name: &str) -> Option<MemberId> {
        self.member_index.get(&normalize_name(unique_name)).copied()
    }

    pub fn member_dimension(&self, member: MemberId) -> DimensionId {
        self.hierarchy(self.member(member).hierarchy).dimension
    }

    /// Resolve the default member: the explicit one, else the all member, else the first root
    /// member, else the null member.
    pub fn default_member(&self, hierarchy: HierarchyId) -> MemberId {
        let h = self.hierarchy(hierarchy);
        if let Some(m) = h.default_member.or(h.all_member) {
            return m;
        }
        h.levels
            .first()
            .and_then(|level| self.level(*level).members.first().copied())
            .unwrap_or(h.null_member)
    }

    pub fn add_dimension(&mut self, name: impl Into<String>) -> ModelResult<DimensionId> {
        self.add_dimension_of_kind(name.into(), DimensionKind::Standard)
    }

    /// Add the `[Measures]` dimension with its single hierarchy and level. Measures are then added
    /// with [`Schema::add_member`] on the returned level.
    pub fn add_measures_dimension(&mut self) -> ModelResult<LevelId> {
        let dim = self.add_dimension_of_kind("Measures".to_string(), DimensionKind::Measures)?;
        let hierarchy = self.add_hierarchy(dim, None, false)?;
        self.add_level(hierarchy, "MeasuresLevel")
    }

    fn add_dimension_of_kind(
        &mut self,
        name: String,
        kind: DimensionKind,
    ) -> ModelResult<DimensionId> {
        let key = normalize_name(&name);
        if self.dimension_index.contains_key(&key) {
            return Err(ModelError::DuplicateDimension(name));
        }
        let id = DimensionId::from_index(self.dimensions.len());
        self.dimensions.push(Dimension {
            unique_name: bracket(&name),
            name,
            kind,
            hierarchies: Vec::new(),
        });
        self.dimension_index.insert(key, id);
        Ok(id)
    }

    /// Add a hierarchy to `dimension`. `name: None` names the hierarchy after its dimension.
    ///
    /// Every hierarchy gets a null member; `has_all` additionally creates an `(All)` level holding
    /// a single all member, which becomes the parent of the first real level's members.
    pub fn add_hierarchy(
        &mut self,
        dimension: DimensionId,
        name: Option<&str>,
        has_all: bool,
    ) -> ModelResult<HierarchyId> {
        let dim = self.dimension(dimension);
        let name = name.unwrap_or(&dim.name).to_string();
        let unique_name = if name == dim.name {
            dim.unique_name.clone()
        } else {
            format!("{}.{}", dim.unique_name, bracket(&name))
        };
        let duplicate = dim
            .hierarchies
            .iter()
            .any(|h| self.hierarchy(*h).name.eq_ignore_ascii_case(&name));
        if duplicate {
            return Err(ModelError::DuplicateHierarchy {
                dimension: dim.name.clone(),
                hierarchy: name,
            });
        }

        let id = HierarchyId::from_index(self.hierarchies.len());
        let null_member = MemberId::from_index(self.members.len());
        self.members.push(Member {
            name: "#null".to_string(),
            unique_name: format!("{unique_name}.[#null]"),
            kind: MemberKind::Null,
            hierarchy: id,
            level: None,
            parent: None,
            children: Vec::new(),
            ordinal: 0,
        });
        self.hierarchies.push(Hierarchy {
            name: name.clone(),
            unique_name,
            dimension,
            levels: Vec::new(),
            all_member: None,
            null_member,
            default_member: None,
        });
        self.dimensions[dimension.index()].hierarchies.push(id);

        if has_all {
            let all_level = self.add_level(id, "(All)")?;
            let all_name = format!("All {name}s");
            let all = self.push_member(all_level, None, all_name, MemberKind::All)?;
            self.hierarchies[id.index()].all_member = Some(all);
        }
        Ok(id)
    }

    pub fn add_level(
        &mut self,
        hierarchy: HierarchyId,
        name: impl Into<String>,
    ) -> ModelResult<LevelId> {
        let name = name.into();
        let h = self.hierarchy(hierarchy);
        if h
            .levels
            .iter()
            .any(|l| self.level(*l).name.eq_ignore_ascii_case(&name))
        {
            return Err(ModelError::DuplicateLevel {
                hierarchy: h.unique_name.clone(),
                level: name,
            });
        }
        let unique_name = format!("{}.{}", h.unique_name, bracket(&name));
        let depth = h.levels.len();
        let id = LevelId::from_index(self.levels.len());
        self.levels.push(Level {
            unique_name,
            name,
            hierarchy,
            depth,
            members: Vec::new(),
        });
        self.hierarchies[hierarchy.index()].levels.push(id);
        Ok(id)
    }

    /// Add a regular member to `level`.
    ///
    /// Members of the first real level take the all member (if any) as parent and must be given
    /// `parent: None`; deeper members need a parent from the level directly above.
    pub fn add_member(
        &mut self,
        level: LevelId,
        parent: Option<MemberId>,
        name: impl Into<String>,
    ) -> ModelResult<MemberId> {
        self.push_member(level, parent, name.into(), MemberKind::Regular)
    }

    pub fn set_default_member(
        &mut self,
        hierarchy: HierarchyId,
        member: MemberId,
    ) -> ModelResult<()> {
        if self.member(member).hierarchy != hierarchy {
            return Err(ModelError::ForeignMember {
                member: self.member(member).unique_name.clone(),
                hierarchy: self.hierarchy(hierarchy).unique_name.clone(),
            });
        }
        self.hierarchies[hierarchy.index()].default_member = Some(member);
        Ok(())
    }

    fn push_member(
        &mut self,
        level: LevelId,
        parent: Option<MemberId>,
        name: String,
        kind: MemberKind,
    ) -> ModelResult<MemberId> {
        let lvl = self.level(level);
        let hierarchy = lvl.hierarchy;
        let h = self.hierarchy(hierarchy);
        let first_real_depth = usize::from(h.all_member.is_some());

        let parent = match (parent, kind) {
            (_, MemberKind::All) | (_, MemberKind::Null) => None,
            (None, _) if lvl.depth == first_real_depth => h.all_member,
            (None, _) => {
                return Err(ModelError::InvalidParent {
                    member: name,
                    reason: format!("members of {} need a parent", lvl.unique_name),
                })
            }
            (Some(p), _) => {
                let parent_member = self.member(p);
                let expected_depth = lvl.depth.checked_sub(1);
                let parent_depth = parent_member.level.map(|l| self.level(l).depth);
                if parent_member.hierarchy != hierarchy || parent_depth != expected_depth {
                    return Err(ModelError::InvalidParent {
                        member: name,
                        reason: format!(
                            "{} is not on the level above {}",
                            parent_member.unique_name, lvl.unique_name
                        ),
                    });
                }
                Some(p)
            }
        };

        let prefix = match parent.map(|p| self.member(p)) {
            Some(p) if p.kind == MemberKind::Regular => p.unique_name.clone(),
            _ => h.unique_name.clone(),
        };
        let unique_name = format!("{prefix}.{}", bracket(&name));
        let key = normalize_name(&unique_name);
        if self.member_index.contains_key(&key) {
            return Err(ModelError::DuplicateMember(unique_name));
        }

        let id = MemberId::from_index(self.members.len());
        let ordinal = lvl.members.len();
        self.members.push(Member {
            name,
            unique_name,
            kind,
            hierarchy,
            level: Some(level),
            parent,
            children: Vec::new(),
            ordinal,
        });
        self.levels[level.index()].members.push(id);
        if let Some(p) = parent {
            self.members[p.index()].children.push(id);
        }
        self.member_index.insert(key, id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_member_parents_first_level() {
        let mut schema = Schema::new("Sales");
        let time = schema.add_dimension("Time").unwrap();
        let h = schema.add_hierarchy(time, None, true).unwrap();
        let year = schema.add_level(h, "Year").unwrap();
        let y1997 = schema.add_member(year, None, "1997").unwrap();

        let all = schema.hierarchy(h).all_member().unwrap();
        assert_eq!(schema.member(y1997).parent(), Some(all));
        assert_eq!(schema.member(all).children(), &[y1997]);
        assert_eq!(schema.member(y1997).unique_name(), "[Time].[1997]");
        assert_eq!(schema.default_member(h), all);
        assert_eq!(schema.lookup_member("[time].[1997]"), Some(y1997));
    }
}
