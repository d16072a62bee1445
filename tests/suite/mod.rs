mod http_flow;
mod persistence;
mod properties;
mod scenarios;
