use assert_matches::assert_matches;

use kira_ortholog_mapper::error::OrthoError;
use kira_ortholog_mapper::parser::{AlignmentHit, GeneListEntry, LinkPair, OrganismEntry, parse};

#[test]
fn gene_list_tolerates_crlf_and_trailing_blank_lines() {
    let text = "eco:b0001\tthrL; thr operon leader peptide\r\neco:b0002\tthrA\r\n\r\n\n";
    let genes: Vec<GeneListEntry> = parse(text).unwrap();
    assert_eq!(genes.len(), 2);
    assert_eq!(genes[0].id.as_str(), "eco:b0001");
    assert_eq!(genes[0].description, "thrL; thr operon leader peptide");
    assert_eq!(genes[1].description, "thrA");
}

#[test]
fn gene_list_four_column_layout_uses_last_column() {
    let text = "eco:b0001\tCDS\t190..255\tthrL; thr operon leader peptide\n";
    let genes: Vec<GeneListEntry> = parse(text).unwrap();
    assert_eq!(genes[0].description, "thrL; thr operon leader peptide");
}

#[test]
fn gene_list_description_is_optional() {
    let genes: Vec<GeneListEntry> = parse("eco:b0003\n").unwrap();
    assert_eq!(genes[0].description, "");
}

#[test]
fn gene_list_rejects_bad_identifier_with_line_number() {
    let err = parse::<GeneListEntry>("eco:b0001\tthrL\nnot-a-gene\tx\n").unwrap_err();
    assert_matches!(err, OrthoError::Parse { line: 2, .. });
}

#[test]
fn link_pairs_ignore_extra_columns() {
    let pairs: Vec<LinkPair> = parse("eco:b0002\tko:K12524\textra\n").unwrap();
    assert_eq!(
        pairs,
        vec![LinkPair {
            left: "eco:b0002".to_string(),
            right: "ko:K12524".to_string(),
        }]
    );
}

#[test]
fn organism_lineage_is_optional() {
    let text = "T01001\thsa\tHomo sapiens (human)\tEukaryotes;Animals\nT00007\teco\tEscherichia coli\n";
    let organisms: Vec<OrganismEntry> = parse(text).unwrap();
    assert_eq!(organisms[0].lineage.as_deref(), Some("Eukaryotes;Animals"));
    assert_eq!(organisms[1].code, "eco");
    assert_eq!(organisms[1].lineage, None);
}

#[test]
fn alignment_hits_with_and_without_definition() {
    let text = "hsa:10458\t1520\t85.3\t410\t420\tthreonine synthase\nmmu:12345\t900\t45.0%\t300\t402\n";
    let hits: Vec<AlignmentHit> = parse(text).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].target.as_str(), "hsa:10458");
    assert_eq!(hits[0].sw_score, 1520);
    assert_eq!(hits[0].length, 420);
    assert_eq!(hits[0].definition.as_deref(), Some("threonine synthase"));
    assert_eq!(hits[1].identity, 45.0);
    assert_eq!(hits[1].definition, None);
}

#[test]
fn alignment_rejects_unparsable_numbers() {
    let text = "hsa:10458\t1520\t85.3\t410\t420\nmmu:12345\tmany\t45.0\t300\t402\n";
    let err = parse::<AlignmentHit>(text).unwrap_err();
    assert_matches!(err, OrthoError::Parse { line: 2, ref message } if message.contains("sw_score"));
}

#[test]
fn alignment_rejects_identity_out_of_range() {
    let err = parse::<AlignmentHit>("hsa:10458\t1520\t185\t410\t420\n").unwrap_err();
    assert_matches!(err, OrthoError::Parse { line: 1, .. });
}
