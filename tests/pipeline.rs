use libunitigger::chunks::BranchPointKind;
use libunitigger::{
    EdgeLabel, FragmentEnd, FragmentKind, FragmentLabel, FragmentRecord, OverlapGraph,
    OverlapRecord, Unitigger, UnitiggerConfiguration, UnitiggerOutput,
};

fn ingest(lengths: &[i64], overlaps: &[OverlapRecord]) -> OverlapGraph {
    let configuration = UnitiggerConfiguration::default();
    let mut graph = OverlapGraph::new();
    for (iid, &length) in (1..).zip(lengths) {
        graph
            .add_fragment(FragmentRecord::new(iid, length, FragmentKind::Read))
            .unwrap();
    }
    for overlap in overlaps {
        graph.add_overlap(overlap, &configuration).unwrap();
    }
    graph
}

fn run(graph: &mut OverlapGraph) -> UnitiggerOutput {
    Unitigger::default().run(graph).unwrap()
}

fn member_iids(output: &UnitiggerOutput, chunk: usize) -> Vec<u64> {
    let chunk = output.chunks.chunk(chunk).unwrap();
    output
        .chunks
        .members(chunk)
        .iter()
        .map(|member| member.iid)
        .collect()
}

#[test]
fn test_chain_of_five_fragments() {
    let overlaps: Vec<_> = (1..5)
        .map(|iid| OverlapRecord::new(iid, true, iid + 1, false, 900, 900))
        .collect();
    let mut graph = ingest(&[1000; 5], &overlaps);
    let output = run(&mut graph);

    assert_eq!(output.chunks.len(), 1);
    assert_eq!(member_iids(&output, 0), vec![1, 2, 3, 4, 5]);
    let chunk = output.chunks.chunk(0).unwrap();
    assert_eq!(chunk.rho, 4 * 900);
    assert_eq!(chunk.bp_length, 4600);
    assert_eq!(chunk.a_tip, FragmentEnd::new(0, false));
    assert_eq!(chunk.b_tip, FragmentEnd::new(4, true));
    assert_eq!(chunk.a_branch_point.kind, BranchPointKind::None);
    assert_eq!(chunk.b_branch_point.kind, BranchPointKind::None);
    assert!(!chunk.circular);

    assert_eq!(output.arrival_rate.total_arrivals, 4);
    assert!((output.arrival_rate.rate - 4.0 / 3600.0).abs() < 1e-12);
    let expected_statistic = 4.0 - std::f64::consts::LN_2 * 4.0;
    assert!((chunk.coverage_statistic - expected_statistic).abs() < 1e-9);

    assert_eq!(output.reports.blessed_edges, 0);
    assert_eq!(output.reports.trimmed_ends, 0);
    assert!(output.occurrences.is_clean());
    assert_eq!(output.labels.fragment_count(FragmentLabel::Intrachunk), 3);
    assert_eq!(output.labels.fragment_count(FragmentLabel::HangingChunk), 2);
}

#[test]
fn test_transitive_triangle_collapses_into_one_chunk() {
    let overlaps = [
        OverlapRecord::new(1, true, 2, false, 300, 300),
        OverlapRecord::new(2, true, 3, false, 300, 300),
        OverlapRecord::new(1, true, 3, false, 600, 600),
    ];
    let mut graph = ingest(&[1000; 3], &overlaps);
    let output = run(&mut graph);

    let transitive = output.reports.transitive.as_ref().unwrap();
    assert_eq!(transitive.inferred_dovetail, 1);
    assert_eq!(transitive.inferred_containment, 0);
    assert_eq!(graph.edge_count(), 4);

    assert_eq!(output.chunks.len(), 1);
    assert_eq!(member_iids(&output, 0), vec![1, 2, 3]);
    assert_eq!(output.chunks.chunk(0).unwrap().rho, 600);
    assert!(output.occurrences.is_clean());
}

#[test]
fn test_contained_fragment_is_placed_by_its_container() {
    let overlaps = [
        OverlapRecord::new(1, true, 2, false, 600, 600),
        OverlapRecord::new(3, false, 1, false, -200, 300),
    ];
    let mut graph = ingest(&[1000, 1000, 500], &overlaps);
    let output = run(&mut graph);

    assert_eq!(output.reports.contained_fragments, 1);
    assert_eq!(output.chunks.len(), 1);
    assert_eq!(member_iids(&output, 0), vec![1, 3, 2]);

    let chunk = output.chunks.chunk(0).unwrap();
    assert_eq!(chunk.essential_fragments, 2);
    assert_eq!(chunk.contained_fragments, 1);
    let contained = output.chunks.members(chunk)[1];
    assert_eq!(contained.container, Some(1));
    assert_eq!((contained.offset5p, contained.offset3p), (700, 200));
    assert_eq!(graph.fragments()[2].label, FragmentLabel::SingleCont);
    assert!(output.occurrences.is_clean());
}

#[test]
fn test_cycle_becomes_a_circular_chunk() {
    let overlaps = [
        OverlapRecord::new(1, true, 2, false, 500, 500),
        OverlapRecord::new(2, true, 3, false, 500, 500),
        OverlapRecord::new(3, true, 1, false, 500, 500),
    ];
    let mut graph = ingest(&[1000; 3], &overlaps);
    let output = run(&mut graph);

    assert_eq!(output.chunks.len(), 1);
    let chunk = output.chunks.chunk(0).unwrap();
    assert!(chunk.circular);
    assert_eq!(output.chunks.members(chunk).len(), 3);
    assert_eq!(chunk.a_tip.fragment, chunk.b_tip.fragment);
    assert_eq!(chunk.a_tip, chunk.b_tip.opposite());
    assert!(output.occurrences.is_clean());
}

#[test]
fn test_unique_chunks_bless_their_overlaps() {
    let overlaps: Vec<_> = (1..5)
        .map(|iid| OverlapRecord::new(iid, true, iid + 1, false, 900, 900))
        .collect();
    let mut graph = ingest(&[1000; 5], &overlaps);
    let output = Unitigger::new(UnitiggerConfiguration {
        cgb_unique_cutoff: 1.0,
        ..Default::default()
    })
    .run(&mut graph)
    .unwrap();

    assert_eq!(output.reports.blessed_edges, 8);
    assert!(graph.edges().iter().all(|edge| edge.blessed));
}

#[test]
fn test_genome_length_overrides_the_estimated_arrival_rate() {
    let overlaps: Vec<_> = (1..5)
        .map(|iid| OverlapRecord::new(iid, true, iid + 1, false, 900, 900))
        .collect();
    let mut graph = ingest(&[1000; 5], &overlaps);
    let output = Unitigger::new(UnitiggerConfiguration {
        nbase_in_genome: 5000,
        ..Default::default()
    })
    .run(&mut graph)
    .unwrap();

    assert!((output.arrival_rate.computed_rate - 4.0 / 3600.0).abs() < 1e-12);
    assert!((output.arrival_rate.rate - 0.001).abs() < 1e-12);
}

#[test]
fn test_deleted_fragments_are_left_out() {
    let overlaps = [
        OverlapRecord::new(1, true, 2, false, 900, 900),
        OverlapRecord::new(2, true, 3, false, 900, 900),
    ];
    let configuration = UnitiggerConfiguration::default();
    let mut graph = OverlapGraph::new();
    for iid in 1..=3 {
        graph
            .add_fragment(FragmentRecord::new(iid, 1000, FragmentKind::Read))
            .unwrap();
    }
    graph.delete_fragment(3).unwrap();
    for overlap in &overlaps {
        graph.add_overlap(overlap, &configuration).unwrap();
    }

    let output = run(&mut graph);
    assert_eq!(output.chunks.len(), 1);
    assert_eq!(member_iids(&output, 0), vec![1, 2]);
    assert!(output.occurrences.is_clean());
}

#[test]
fn test_fragment_contained_in_two_chunks_gets_its_own_chunk() {
    // 5 is contained in 1 and in 3, which lie in different chunks.
    let overlaps = [
        OverlapRecord::new(1, true, 2, false, 900, 900),
        OverlapRecord::new(3, true, 4, false, 900, 900),
        OverlapRecord::new(5, false, 1, false, -200, 500),
        OverlapRecord::new(5, false, 3, false, -200, 500),
    ];
    let mut graph = ingest(&[1000, 1000, 1000, 1000, 300], &overlaps);
    let output = run(&mut graph);

    assert_eq!(graph.fragments()[4].label, FragmentLabel::MultiCont);
    assert_eq!(output.chunks.len(), 3);
    assert_eq!(member_iids(&output, 0), vec![1, 2]);
    assert_eq!(member_iids(&output, 1), vec![3, 4]);
    assert_eq!(member_iids(&output, 2), vec![5]);

    let chunk = output.chunks.chunk(2).unwrap();
    let member = output.chunks.members(chunk)[0];
    assert_eq!((member.offset5p, member.offset3p), (0, 300));
    assert_eq!(member.container, None);
    assert!(output.occurrences.is_clean());
}

#[test]
fn test_branch_multi_contained_fragment_is_a_singleton() {
    // The thickest edge of 1 leads to 2, which is contained in 3.
    let overlaps = [
        OverlapRecord::new(1, true, 2, false, 800, 300),
        OverlapRecord::new(2, false, 3, false, -100, 400),
    ];
    let mut graph = ingest(&[1000, 500, 1000], &overlaps);
    let output = run(&mut graph);

    assert_eq!(output.reports.contained_fragments, 1);
    assert_eq!(output.reports.essential_components, 1);
    assert_eq!(graph.fragments()[1].label, FragmentLabel::BranchMultiCont);
    assert_eq!(output.labels.edge_count(EdgeLabel::Interchunk), 2);

    assert_eq!(output.chunks.len(), 3);
    assert_eq!(member_iids(&output, 0), vec![1]);
    assert_eq!(member_iids(&output, 1), vec![2]);
    assert_eq!(member_iids(&output, 2), vec![3]);
    assert!(output.occurrences.is_clean());
}

#[test]
fn test_chain_rho_ignores_contained_fragments() {
    // 3 is contained near the far end of 2, starting at 1300 in the chunk.
    let overlaps = [
        OverlapRecord::new(1, true, 2, false, 600, 600),
        OverlapRecord::new(3, false, 2, false, -700, 100),
    ];
    let mut graph = ingest(&[1000, 1000, 200], &overlaps);
    let output = run(&mut graph);

    assert_eq!(output.chunks.len(), 1);
    assert_eq!(member_iids(&output, 0), vec![1, 2, 3]);
    let chunk = output.chunks.chunk(0).unwrap();
    assert_eq!(chunk.rho, 600);
    assert_eq!(chunk.bp_length, 1600);

    let contained = output.chunks.members(chunk)[2];
    assert_eq!(contained.container, Some(2));
    assert_eq!((contained.offset5p, contained.offset3p), (1500, 1300));
    assert!(output.occurrences.is_clean());
}
