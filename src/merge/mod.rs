pub mod contracted_edge_container;
