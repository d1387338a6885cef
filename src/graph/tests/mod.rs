mod graph_broadcast;
mod graph_layers;
mod graph_ops;
