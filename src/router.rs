use crate::gateway::BoardView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tab {
    Home,
    Boards,
    Jobs,
    Companies,
}

impl Tab {
    pub const ALL: [Tab; 4] = [Tab::Home, Tab::Boards, Tab::Jobs, Tab::Companies];

    pub fn id(self) -> &'static str {
        match self {
            Tab::Home => "hometab",
            Tab::Boards => "boardtab",
            Tab::Jobs => "jobtab",
            Tab::Companies => "companiestab",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Tab::Home => "Home",
            Tab::Boards => "Boards",
            Tab::Jobs => "Jobs",
            Tab::Companies => "Companies",
        }
    }

    pub fn from_id(id: &str) -> Option<Tab> {
        Self::ALL.into_iter().find(|t| t.id() == id)
    }

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }

    pub fn next(self) -> Tab {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Tab {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

/// Output regions, named after the element ids of the dashboard markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionId {
    BoardsTable,
    JobsInfo,
    JobsChart,
    JobsTable,
    CompaniesTable,
}

impl RegionId {
    pub fn as_str(self) -> &'static str {
        match self {
            RegionId::BoardsTable => "boards-query-table",
            RegionId::JobsInfo => "jobs-info-container",
            RegionId::JobsChart => "jobs-count-graph",
            RegionId::JobsTable => "jobs-query-table",
            RegionId::CompaniesTable => "companies-query-output",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlId {
    BoardsDropdown,
    JobsQuery,
    CompaniesQuery,
}

impl ControlId {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlId::BoardsDropdown => "boards-selection-dropdown",
            ControlId::JobsQuery => "jobs-tsv-query",
            ControlId::CompaniesQuery => "companies-tsv-query",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerId {
    BoardsRun,
    JobsSubmit,
    CompaniesSubmit,
}

impl TriggerId {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerId::BoardsRun => "boards-selection-btn",
            TriggerId::JobsSubmit => "jobs-tsv-btn",
            TriggerId::CompaniesSubmit => "companies-tsv-btn",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TriggerId::BoardsRun => "Run",
            TriggerId::JobsSubmit | TriggerId::CompaniesSubmit => "Submit",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterControl {
    /// Options are `(label, value)` pairs.
    Dropdown {
        id: ControlId,
        options: Vec<(&'static str, &'static str)>,
        default: &'static str,
    },
    TextInput {
        id: ControlId,
        hint: &'static str,
    },
}

impl FilterControl {
    pub fn id(&self) -> ControlId {
        match self {
            FilterControl::Dropdown { id, .. } | FilterControl::TextInput { id, .. } => *id,
        }
    }

    pub fn default_value(&self) -> String {
        match self {
            FilterControl::Dropdown { default, .. } => default.to_string(),
            FilterControl::TextInput { .. } => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TabLayout {
    pub tab: Tab,
    pub heading: Option<&'static str>,
    pub filters: Vec<FilterControl>,
    pub trigger: Option<TriggerId>,
    pub stats_region: Option<RegionId>,
    pub chart_region: Option<RegionId>,
    pub table_region: Option<RegionId>,
}

impl TabLayout {
    pub fn regions(&self) -> Vec<RegionId> {
        [self.stats_region, self.chart_region, self.table_region]
            .into_iter()
            .flatten()
            .collect()
    }
}

pub fn layout_for(tab: Tab) -> Option<TabLayout> {
    let layout = match tab {
        Tab::Home => TabLayout {
            tab,
            heading: Some("Home Tab Content"),
            filters: Vec::new(),
            trigger: None,
            stats_region: None,
            chart_region: None,
            table_region: None,
        },
        Tab::Boards => TabLayout {
            tab,
            heading: None,
            filters: vec![FilterControl::Dropdown {
                id: ControlId::BoardsDropdown,
                options: BoardView::ALL
                    .iter()
                    .map(|v| (v.label(), v.view_name()))
                    .collect(),
                default: BoardView::DataOffers2w.view_name(),
            }],
            trigger: Some(TriggerId::BoardsRun),
            stats_region: None,
            chart_region: None,
            table_region: Some(RegionId::BoardsTable),
        },
        Tab::Jobs => TabLayout {
            tab,
            heading: None,
            filters: vec![FilterControl::TextInput {
                id: ControlId::JobsQuery,
                hint: "Use PostgreSQL full-text search to filter job titles.",
            }],
            trigger: Some(TriggerId::JobsSubmit),
            stats_region: Some(RegionId::JobsInfo),
            chart_region: Some(RegionId::JobsChart),
            table_region: Some(RegionId::JobsTable),
        },
        Tab::Companies => TabLayout {
            tab,
            heading: None,
            filters: vec![FilterControl::TextInput {
                id: ControlId::CompaniesQuery,
                hint: "Use PostgreSQL full-text search to filter company titles.",
            }],
            trigger: Some(TriggerId::CompaniesSubmit),
            stats_region: None,
            chart_region: None,
            table_region: Some(RegionId::CompaniesTable),
        },
    };
    Some(layout)
}

/// Lookup by the tab id string. Unknown ids have no layout.
pub fn layout_for_id(id: &str) -> Option<TabLayout> {
    Tab::from_id(id).and_then(layout_for)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tab_id_round_trips() {
        for tab in Tab::ALL {
            assert_eq!(Tab::from_id(tab.id()), Some(tab));
        }
        assert_eq!(Tab::from_id("settingstab"), None);
    }

    #[test]
    fn unknown_tab_has_no_layout() {
        assert!(layout_for_id("").is_none());
        assert!(layout_for_id("jobs").is_none());
        assert!(layout_for_id("jobtab").is_some());
    }

    #[test]
    fn home_is_structural_only() {
        let layout = layout_for(Tab::Home).unwrap();
        assert!(layout.filters.is_empty());
        assert!(layout.trigger.is_none());
        assert!(layout.regions().is_empty());
    }

    #[test]
    fn jobs_tab_has_all_regions() {
        let layout = layout_for(Tab::Jobs).unwrap();
        assert_eq!(
            layout.regions(),
            vec![RegionId::JobsInfo, RegionId::JobsChart, RegionId::JobsTable]
        );
        assert_eq!(layout.trigger, Some(TriggerId::JobsSubmit));
    }

    #[test]
    fn boards_dropdown_defaults_to_data_offers() {
        let layout = layout_for(Tab::Boards).unwrap();
        match &layout.filters[0] {
            FilterControl::Dropdown {
                options, default, ..
            } => {
                assert_eq!(options.len(), 3);
                assert_eq!(*default, "v_jobboard_data_offers_2w");
            }
            other => panic!("unexpected control {other:?}"),
        }
        assert_eq!(layout.regions(), vec![RegionId::BoardsTable]);
    }

    #[test]
    fn tabs_cycle() {
        assert_eq!(Tab::Companies.next(), Tab::Home);
        assert_eq!(Tab::Home.prev(), Tab::Companies);
        assert_eq!(Tab::Boards.next(), Tab::Jobs);
    }
}
